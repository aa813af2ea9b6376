//! Official review workflow and the recomputation it triggers.

use std::str::FromStr;

use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::DomainError;
use crate::models::{validate_result, Gender, NewSubmission, SubmissionStatus, TestType};
use crate::percentile;
use crate::score::{self, WeightTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
    Flag,
}

impl ReviewDecision {
    pub fn status(&self) -> SubmissionStatus {
        match self {
            ReviewDecision::Approve => SubmissionStatus::Approved,
            ReviewDecision::Reject => SubmissionStatus::Rejected,
            ReviewDecision::Flag => SubmissionStatus::Flagged,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" => Ok(ReviewDecision::Approve),
            "reject" | "rejected" => Ok(ReviewDecision::Reject),
            "flag" | "flagged" => Ok(ReviewDecision::Flag),
            _ => Err(DomainError::InvalidDecision(s.to_string())),
        }
    }
}

/// Status after an official raises a flag. Only pending and approved
/// submissions move; rejected ones stay rejected.
pub fn status_after_flag(current: SubmissionStatus) -> SubmissionStatus {
    match current {
        SubmissionStatus::Pending | SubmissionStatus::Approved => SubmissionStatus::Flagged,
        SubmissionStatus::Rejected | SubmissionStatus::Flagged => current,
    }
}

/// Appends `flag` unless an identical flag is already recorded.
pub fn add_flag_text(flags: &mut Vec<String>, flag: &str) -> bool {
    let flag = flag.trim();
    if flag.is_empty() || flags.iter().any(|existing| existing == flag) {
        return false;
    }
    flags.push(flag.to_string());
    true
}

/// The approved cohort changes only when a submission enters or leaves
/// `Approved`.
pub fn needs_recompute(before: SubmissionStatus, after: SubmissionStatus) -> bool {
    (before == SubmissionStatus::Approved) != (after == SubmissionStatus::Approved)
}

/// The athlete's overall score is stale whenever one of their percentiles was
/// rewritten or the submission entered or left `Approved`.
pub fn needs_overall_refresh(
    percentile_written: bool,
    before: SubmissionStatus,
    after: SubmissionStatus,
) -> bool {
    percentile_written || needs_recompute(before, after)
}

/// Writes a flag raise has to make together.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagUpdate {
    pub flags: Vec<String>,
    pub status: Option<SubmissionStatus>,
}

/// Plans a flag raise: the de-duplicated flag list, plus the new status when
/// the flag moves the submission.
pub fn plan_flag(current: SubmissionStatus, flags: &[String], reason: &str) -> FlagUpdate {
    let mut flags = flags.to_vec();
    add_flag_text(&mut flags, reason);
    let next = status_after_flag(current);
    FlagUpdate {
        flags,
        status: (next != current).then_some(next),
    }
}

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub submission_id: Uuid,
    pub previous: SubmissionStatus,
    pub status: SubmissionStatus,
    pub percentile: Option<f64>,
    pub overall_score: Option<f64>,
}

pub async fn record_submission(pool: &PgPool, submission: &NewSubmission) -> anyhow::Result<Option<Uuid>> {
    validate_result(submission.result)?;
    let id = db::insert_submission(pool, submission).await?;
    match id {
        Some(id) => log::info!(
            "recorded {} submission {id} for {}",
            submission.test_type,
            submission.athlete_email
        ),
        None => log::warn!(
            "submission with source key {:?} already exists",
            submission.source_key
        ),
    }
    Ok(id)
}

/// Computes and stores the percentile of one submission against the other
/// approved submissions of its test and gender.
pub async fn refresh_percentile(pool: &PgPool, submission_id: Uuid) -> anyhow::Result<f64> {
    let submission = db::fetch_submission(pool, submission_id)
        .await?
        .with_context(|| format!("submission {submission_id} not found"))?;
    let result = validate_result(submission.result)?;

    let cohort = db::fetch_cohort_results(
        pool,
        submission.test_type,
        submission.gender,
        Some(submission_id),
    )
    .await
    .context("failed to load approved cohort")?;

    let standing = percentile::calculate_standing(submission.test_type, result, &cohort);
    log::info!(
        "submission {submission_id}: {} of {} approved results are better, percentile {}",
        standing.better_count,
        standing.total_count,
        standing.percentile
    );
    db::write_percentile(pool, submission_id, standing.percentile).await?;
    Ok(standing.percentile)
}

/// Refolds an athlete's best approved percentiles into their overall score.
pub async fn refresh_overall_score(
    pool: &PgPool,
    athlete_id: Uuid,
    weights: &WeightTable,
) -> anyhow::Result<f64> {
    let percentiles = db::best_percentiles(pool, athlete_id).await?;
    let overall = score::overall_score(&percentiles, weights);
    db::write_overall_score(pool, athlete_id, overall).await?;
    log::info!(
        "athlete {athlete_id}: overall score {overall} across {} tests",
        percentiles.len()
    );
    Ok(overall)
}

pub async fn apply_decision(
    pool: &PgPool,
    submission_id: Uuid,
    decision: ReviewDecision,
    reviewer: &str,
    comments: Option<&str>,
    weights: &WeightTable,
) -> anyhow::Result<ReviewOutcome> {
    let submission = db::fetch_submission(pool, submission_id)
        .await?
        .with_context(|| format!("submission {submission_id} not found"))?;
    let previous = submission.status;
    let status = decision.status();

    db::update_status(pool, submission_id, status, Some(reviewer), comments).await?;

    let percentile = if status == SubmissionStatus::Approved {
        Some(refresh_percentile(pool, submission_id).await?)
    } else {
        None
    };

    let overall_score = if needs_overall_refresh(percentile.is_some(), previous, status) {
        Some(refresh_overall_score(pool, submission.athlete_id, weights).await?)
    } else {
        None
    };

    Ok(ReviewOutcome {
        submission_id,
        previous,
        status,
        percentile,
        overall_score,
    })
}

pub async fn flag_submission(
    pool: &PgPool,
    submission_id: Uuid,
    reason: &str,
    official: &str,
    weights: &WeightTable,
) -> anyhow::Result<ReviewOutcome> {
    let submission = db::fetch_submission(pool, submission_id)
        .await?
        .with_context(|| format!("submission {submission_id} not found"))?;
    let previous = submission.status;
    let update = plan_flag(previous, &submission.flags, reason);
    if update.flags == submission.flags {
        log::debug!("flag {reason:?} already present on {submission_id}");
    }
    db::write_flag_update(pool, submission_id, &update, official, reason).await?;
    let status = update.status.unwrap_or(previous);

    let overall_score = if needs_recompute(previous, status) {
        Some(refresh_overall_score(pool, submission.athlete_id, weights).await?)
    } else {
        None
    };

    Ok(ReviewOutcome {
        submission_id,
        previous,
        status,
        percentile: None,
        overall_score,
    })
}

/// Recomputes every cached percentile in an approved cohort, then the overall
/// score of each athlete that appears in it.
pub async fn recompute_cohort(
    pool: &PgPool,
    test_type: TestType,
    gender: Gender,
    weights: &WeightTable,
) -> anyhow::Result<usize> {
    let members = db::fetch_cohort_members(pool, test_type, gender).await?;
    let results: Vec<f64> = members.iter().map(|member| member.result).collect();
    let standings = percentile::standings(test_type, &results);

    let mut athletes = Vec::new();
    for (member, standing) in members.iter().zip(standings.iter()) {
        db::write_percentile(pool, member.submission_id, standing.percentile).await?;
        if !athletes.contains(&member.athlete_id) {
            athletes.push(member.athlete_id);
        }
    }

    for athlete_id in athletes {
        refresh_overall_score(pool, athlete_id, weights).await?;
    }

    log::info!(
        "recomputed {} percentiles for {test_type}/{gender}",
        members.len()
    );
    Ok(members.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_map_to_terminal_statuses() {
        assert_eq!("approved".parse::<ReviewDecision>().unwrap().status(), SubmissionStatus::Approved);
        assert_eq!("reject".parse::<ReviewDecision>().unwrap().status(), SubmissionStatus::Rejected);
        assert_eq!("Flagged".parse::<ReviewDecision>().unwrap().status(), SubmissionStatus::Flagged);
        assert_eq!(
            "pending".parse::<ReviewDecision>(),
            Err(DomainError::InvalidDecision("pending".to_string()))
        );
    }

    #[test]
    fn flagging_moves_only_pending_and_approved() {
        assert_eq!(status_after_flag(SubmissionStatus::Pending), SubmissionStatus::Flagged);
        assert_eq!(status_after_flag(SubmissionStatus::Approved), SubmissionStatus::Flagged);
        assert_eq!(status_after_flag(SubmissionStatus::Rejected), SubmissionStatus::Rejected);
        assert_eq!(status_after_flag(SubmissionStatus::Flagged), SubmissionStatus::Flagged);
    }

    #[test]
    fn flags_are_deduplicated() {
        let mut flags = vec!["timing_mismatch".to_string()];
        assert!(!add_flag_text(&mut flags, "timing_mismatch"));
        assert!(!add_flag_text(&mut flags, "   "));
        assert!(add_flag_text(&mut flags, " incomplete_reps "));
        assert_eq!(flags, vec!["timing_mismatch", "incomplete_reps"]);
    }

    #[test]
    fn recompute_only_when_approval_changes() {
        use SubmissionStatus::*;
        assert!(needs_recompute(Pending, Approved));
        assert!(needs_recompute(Approved, Rejected));
        assert!(needs_recompute(Approved, Flagged));
        assert!(!needs_recompute(Pending, Rejected));
        assert!(!needs_recompute(Flagged, Rejected));
        assert!(!needs_recompute(Approved, Approved));
    }

    #[test]
    fn reapproval_with_new_percentile_refreshes_overall_score() {
        use SubmissionStatus::*;
        assert!(needs_overall_refresh(true, Approved, Approved));
        assert!(needs_overall_refresh(true, Pending, Approved));
        assert!(needs_overall_refresh(false, Approved, Rejected));
        assert!(!needs_overall_refresh(false, Pending, Rejected));
        assert!(!needs_overall_refresh(false, Flagged, Flagged));
    }

    #[test]
    fn flag_plan_carries_flags_and_status_together() {
        let existing = vec!["timing_mismatch".to_string()];

        let update = plan_flag(SubmissionStatus::Approved, &existing, "incomplete_reps");
        assert_eq!(update.flags, vec!["timing_mismatch", "incomplete_reps"]);
        assert_eq!(update.status, Some(SubmissionStatus::Flagged));

        let update = plan_flag(SubmissionStatus::Rejected, &existing, "timing_mismatch");
        assert_eq!(update.flags, existing);
        assert_eq!(update.status, None);
    }
}
