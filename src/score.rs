use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Context;

use crate::error::DomainError;
use crate::models::{AthleteScore, TestType};

/// Per-test weights for the overall score. Tests without an entry contribute
/// nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    weights: BTreeMap<TestType, f64>,
}

impl WeightTable {
    pub fn standard() -> Self {
        Self {
            weights: BTreeMap::from([
                (TestType::VerticalJump, 0.15),
                (TestType::SitUps, 0.15),
                (TestType::ShuttleRun, 0.15),
                (TestType::EnduranceRun, 0.20),
                (TestType::PushUps, 0.10),
                (TestType::Flexibility, 0.10),
                (TestType::Balance, 0.05),
                (TestType::BroadJump, 0.10),
            ]),
        }
    }

    pub fn new<I>(entries: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = (TestType, f64)>,
    {
        let mut weights = BTreeMap::new();
        for (test, weight) in entries {
            if !weight.is_finite() || weight < 0.0 {
                return Err(DomainError::InvalidWeight {
                    test: test.to_string(),
                    weight,
                });
            }
            weights.insert(test, weight);
        }
        Ok(Self { weights })
    }

    /// Loads a table from a JSON object of `{"test-label": weight}`.
    pub fn from_json_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read weight table {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid weight table in {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let labels: HashMap<String, f64> = serde_json::from_str(raw)?;
        let mut entries = Vec::with_capacity(labels.len());
        for (label, weight) in labels {
            entries.push((label.parse::<TestType>()?, weight));
        }
        Ok(Self::new(entries)?)
    }

    pub fn weight(&self, test: TestType) -> Option<f64> {
        self.weights.get(&test).copied()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Weighted mean of the percentiles present, renormalized over the weights of
/// the tests actually completed. Returns 0 when nothing carries weight.
pub fn overall_score(percentiles: &HashMap<TestType, f64>, weights: &WeightTable) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    // Sorted so the floating point sum does not depend on hash order.
    let mut entries: Vec<(&TestType, &f64)> = percentiles.iter().collect();
    entries.sort_by_key(|(test, _)| **test);

    for (test, percentile) in entries {
        let Some(weight) = weights.weight(*test) else {
            continue;
        };
        weighted_sum += percentile * weight;
        weight_total += weight;
    }

    if weight_total == 0.0 {
        0.0
    } else {
        (weighted_sum / weight_total).round()
    }
}

/// Builds a percentile map from free-form labels, skipping labels that do not
/// name a known test.
pub fn percentile_map_from_labels<'a, I>(entries: I) -> HashMap<TestType, f64>
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut map = HashMap::new();
    for (label, percentile) in entries {
        match label.parse::<TestType>() {
            Ok(test) => {
                map.insert(test, percentile);
            }
            Err(err) => log::debug!("ignoring percentile entry: {err}"),
        }
    }
    map
}

/// Orders athletes by overall score and assigns competition ranks, so equal
/// scores share a rank and the next rank skips ahead (1, 2, 2, 4).
pub fn rank_athletes(mut athletes: Vec<AthleteScore>) -> Vec<AthleteScore> {
    athletes.sort_by(|a, b| {
        b.overall_score
            .partial_cmp(&a.overall_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.athlete_name.cmp(&b.athlete_name))
    });

    let mut previous: Option<(f64, usize)> = None;
    for (index, athlete) in athletes.iter_mut().enumerate() {
        let rank = match previous {
            Some((score, rank)) if score == athlete.overall_score => rank,
            _ => index + 1,
        };
        athlete.rank = Some(rank);
        previous = Some((athlete.overall_score, rank));
    }

    athletes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Gender;
    use uuid::Uuid;

    fn athlete(name: &str, overall_score: f64) -> AthleteScore {
        AthleteScore {
            athlete_id: Uuid::new_v4(),
            athlete_name: name.to_string(),
            athlete_email: format!("{}@example.com", name.to_lowercase()),
            gender: Gender::Male,
            overall_score,
            scored_tests: 1,
            rank: None,
        }
    }

    #[test]
    fn standard_weights_sum_to_one() {
        let table = WeightTable::standard();
        assert!((table.total() - 1.0).abs() < 1e-9);
        assert_eq!(table.weight(TestType::EnduranceRun), Some(0.20));
        assert_eq!(table.weight(TestType::HeightWeight), None);
    }

    #[test]
    fn partial_completion_is_not_deflated() {
        let percentiles = HashMap::from([(TestType::VerticalJump, 80.0), (TestType::SitUps, 80.0)]);
        assert_eq!(overall_score(&percentiles, &WeightTable::standard()), 80.0);
    }

    #[test]
    fn weighted_mean_over_completed_tests() {
        let percentiles = HashMap::from([
            (TestType::EnduranceRun, 90.0),
            (TestType::Balance, 30.0),
        ]);
        // (90 * 0.20 + 30 * 0.05) / 0.25 = 78
        assert_eq!(overall_score(&percentiles, &WeightTable::standard()), 78.0);
    }

    #[test]
    fn composer_is_idempotent() {
        let percentiles = HashMap::from([
            (TestType::VerticalJump, 61.0),
            (TestType::ShuttleRun, 47.0),
            (TestType::PushUps, 88.0),
            (TestType::Flexibility, 12.0),
        ]);
        let weights = WeightTable::standard();
        let first = overall_score(&percentiles, &weights);
        let second = overall_score(&percentiles, &weights);
        assert_eq!(first, second);
    }

    #[test]
    fn no_completed_tests_scores_zero() {
        assert_eq!(overall_score(&HashMap::new(), &WeightTable::standard()), 0.0);
        let unweighted = HashMap::from([(TestType::HeightWeight, 95.0)]);
        assert_eq!(overall_score(&unweighted, &WeightTable::standard()), 0.0);
    }

    #[test]
    fn unknown_test_labels_are_ignored() {
        let weights = WeightTable::standard();
        let without = percentile_map_from_labels([("vertical-jump", 70.0), ("sit-ups", 40.0)]);
        let with = percentile_map_from_labels([
            ("vertical-jump", 70.0),
            ("sit-ups", 40.0),
            ("unknown-test", 99.0),
        ]);
        assert_eq!(without, with);
        assert_eq!(overall_score(&with, &weights), overall_score(&without, &weights));
    }

    #[test]
    fn tests_missing_from_table_contribute_nothing() {
        let weights = WeightTable::standard();
        let base = HashMap::from([(TestType::BroadJump, 64.0)]);
        let mut extended = base.clone();
        extended.insert(TestType::HeightWeight, 3.0);
        assert_eq!(overall_score(&base, &weights), overall_score(&extended, &weights));
    }

    #[test]
    fn custom_table_is_injected() {
        let weights = WeightTable::new([(TestType::SitUps, 1.0)]).unwrap();
        let percentiles = HashMap::from([(TestType::SitUps, 20.0), (TestType::VerticalJump, 100.0)]);
        assert_eq!(overall_score(&percentiles, &weights), 20.0);
    }

    #[test]
    fn weight_table_rejects_negative_or_unknown_entries() {
        assert!(WeightTable::new([(TestType::Balance, -0.1)]).is_err());
        assert!(WeightTable::new([(TestType::Balance, f64::NAN)]).is_err());
        assert!(WeightTable::from_json_str(r#"{"juggling": 0.5}"#).is_err());

        let table = WeightTable::from_json_str(r#"{"balance": 0.5, "shuttle-run": 0.5}"#).unwrap();
        assert_eq!(table.weight(TestType::Balance), Some(0.5));
        assert_eq!(table.weight(TestType::SitUps), None);
    }

    #[test]
    fn ranks_share_positions_on_ties() {
        let ranked = rank_athletes(vec![
            athlete("Dev", 71.0),
            athlete("Asha", 88.0),
            athlete("Kabir", 71.0),
            athlete("Meera", 40.0),
        ]);
        let ranks: Vec<(String, Option<usize>)> = ranked
            .iter()
            .map(|a| (a.athlete_name.clone(), a.rank))
            .collect();
        assert_eq!(
            ranks,
            vec![
                ("Asha".to_string(), Some(1)),
                ("Dev".to_string(), Some(2)),
                ("Kabir".to_string(), Some(2)),
                ("Meera".to_string(), Some(4)),
            ]
        );
    }
}
