use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Fitness tests an athlete can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    VerticalJump,
    SitUps,
    ShuttleRun,
    EnduranceRun,
    PushUps,
    Flexibility,
    Balance,
    BroadJump,
    HeightWeight,
}

/// Which way a result improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// True when `candidate` strictly beats `target`. Ties are never better.
    pub fn is_better(self, candidate: f64, target: f64) -> bool {
        match self {
            Direction::HigherIsBetter => candidate > target,
            Direction::LowerIsBetter => candidate < target,
        }
    }
}

impl TestType {
    pub fn all() -> &'static [TestType] {
        &[
            TestType::VerticalJump,
            TestType::SitUps,
            TestType::ShuttleRun,
            TestType::EnduranceRun,
            TestType::PushUps,
            TestType::Flexibility,
            TestType::Balance,
            TestType::BroadJump,
            TestType::HeightWeight,
        ]
    }

    pub fn direction(&self) -> Direction {
        match self {
            TestType::ShuttleRun => Direction::LowerIsBetter,
            TestType::VerticalJump
            | TestType::SitUps
            | TestType::EnduranceRun
            | TestType::PushUps
            | TestType::Flexibility
            | TestType::Balance
            | TestType::BroadJump
            | TestType::HeightWeight => Direction::HigherIsBetter,
        }
    }

    /// Stable label used in the database, CSV files and weight tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::VerticalJump => "vertical-jump",
            TestType::SitUps => "sit-ups",
            TestType::ShuttleRun => "shuttle-run",
            TestType::EnduranceRun => "endurance-run",
            TestType::PushUps => "push-ups",
            TestType::Flexibility => "flexibility",
            TestType::Balance => "balance",
            TestType::BroadJump => "broad-jump",
            TestType::HeightWeight => "height-weight",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TestType::VerticalJump => "Vertical Jump",
            TestType::SitUps => "Sit-ups",
            TestType::ShuttleRun => "Shuttle Run",
            TestType::EnduranceRun => "Endurance Run",
            TestType::PushUps => "Push-ups",
            TestType::Flexibility => "Flexibility Test",
            TestType::Balance => "Balance Test",
            TestType::BroadJump => "Broad Jump",
            TestType::HeightWeight => "Height & Weight",
        }
    }
}

impl FromStr for TestType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        TestType::all()
            .iter()
            .copied()
            .find(|test| test.as_str() == label)
            .ok_or_else(|| DomainError::UnknownTestType(s.to_string()))
    }
}

impl std::fmt::Display for TestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(DomainError::UnknownGender(s.to_string())),
        }
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of a submission. Only `Approved` submissions form cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    Flagged,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::Flagged => "flagged",
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(SubmissionStatus::Pending),
            "approved" => Ok(SubmissionStatus::Approved),
            "rejected" => Ok(SubmissionStatus::Rejected),
            "flagged" => Ok(SubmissionStatus::Flagged),
            _ => Err(DomainError::UnknownStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultUnit {
    Cm,
    M,
    Sec,
    Min,
    Kg,
    Count,
    Reps,
}

impl ResultUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultUnit::Cm => "cm",
            ResultUnit::M => "m",
            ResultUnit::Sec => "sec",
            ResultUnit::Min => "min",
            ResultUnit::Kg => "kg",
            ResultUnit::Count => "count",
            ResultUnit::Reps => "reps",
        }
    }
}

impl FromStr for ResultUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cm" => Ok(ResultUnit::Cm),
            "m" => Ok(ResultUnit::M),
            "sec" | "s" => Ok(ResultUnit::Sec),
            "min" => Ok(ResultUnit::Min),
            "kg" => Ok(ResultUnit::Kg),
            "count" => Ok(ResultUnit::Count),
            "reps" => Ok(ResultUnit::Reps),
            _ => Err(DomainError::UnknownUnit(s.to_string())),
        }
    }
}

impl std::fmt::Display for ResultUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejects NaN and infinite results before they reach the calculator.
pub fn validate_result(result: f64) -> Result<f64, DomainError> {
    if result.is_finite() {
        Ok(result)
    } else {
        Err(DomainError::NonFiniteResult(result))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub athlete_id: Uuid,
    pub athlete_name: String,
    pub athlete_email: String,
    pub test_type: TestType,
    pub gender: Gender,
    pub result: f64,
    pub result_unit: ResultUnit,
    pub status: SubmissionStatus,
    pub percentile: Option<f64>,
    pub flags: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn result_display(&self) -> String {
        format!("{}{}", self.result, self.result_unit)
    }
}

/// Submission to be stored, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub athlete_email: String,
    pub test_type: TestType,
    pub result: f64,
    pub result_unit: ResultUnit,
    pub source_key: Option<String>,
}

/// One approved submission inside a (test, gender) cohort.
#[derive(Debug, Clone)]
pub struct CohortMember {
    pub submission_id: Uuid,
    pub athlete_id: Uuid,
    pub result: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AthleteScore {
    pub athlete_id: Uuid,
    pub athlete_name: String,
    pub athlete_email: String,
    pub gender: Gender,
    pub overall_score: f64,
    /// Approved submissions carrying a percentile.
    pub scored_tests: i64,
    pub rank: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct CohortSummary {
    pub test_type: TestType,
    pub gender: Gender,
    pub approved_count: i64,
    pub mean_result: f64,
    pub best_result: f64,
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: SubmissionStatus,
    pub changed_by: Option<String>,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuttle_run_is_the_only_lower_is_better_test() {
        for test in TestType::all() {
            let expected = if *test == TestType::ShuttleRun {
                Direction::LowerIsBetter
            } else {
                Direction::HigherIsBetter
            };
            assert_eq!(test.direction(), expected, "{test}");
        }
    }

    #[test]
    fn ties_are_never_better() {
        assert!(!Direction::HigherIsBetter.is_better(50.0, 50.0));
        assert!(!Direction::LowerIsBetter.is_better(11.0, 11.0));
        assert!(Direction::LowerIsBetter.is_better(10.0, 11.0));
        assert!(Direction::HigherIsBetter.is_better(60.0, 50.0));
    }

    #[test]
    fn test_type_labels_round_trip() {
        for test in TestType::all() {
            assert_eq!(test.as_str().parse::<TestType>().unwrap(), *test);
        }
        assert_eq!(" Shuttle-Run ".parse::<TestType>().unwrap(), TestType::ShuttleRun);
        assert_eq!(
            "unknown-test".parse::<TestType>(),
            Err(DomainError::UnknownTestType("unknown-test".to_string()))
        );
    }

    #[test]
    fn parses_status_gender_and_unit() {
        assert_eq!("APPROVED".parse::<SubmissionStatus>().unwrap(), SubmissionStatus::Approved);
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("s".parse::<ResultUnit>().unwrap(), ResultUnit::Sec);
        assert!("unknown".parse::<Gender>().is_err());
        assert!("parsecs".parse::<ResultUnit>().is_err());
    }

    #[test]
    fn validate_result_rejects_non_finite_values() {
        assert_eq!(validate_result(0.0), Ok(0.0));
        assert_eq!(validate_result(-3.5), Ok(-3.5));
        assert!(validate_result(f64::NAN).is_err());
        assert!(validate_result(f64::INFINITY).is_err());
    }

    #[test]
    fn result_display_joins_value_and_unit() {
        let record = SubmissionRecord {
            id: Uuid::new_v4(),
            athlete_id: Uuid::new_v4(),
            athlete_name: "Priya Sharma".to_string(),
            athlete_email: "priya@example.com".to_string(),
            test_type: TestType::VerticalJump,
            gender: Gender::Female,
            result: 48.0,
            result_unit: ResultUnit::Cm,
            status: SubmissionStatus::Pending,
            percentile: None,
            flags: Vec::new(),
            submitted_at: Utc::now(),
        };
        assert_eq!(record.result_display(), "48cm");
    }
}
