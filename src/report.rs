use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{AthleteScore, CohortSummary, SubmissionRecord, TestType};

/// Open submissions per test, busiest test first.
pub fn pending_by_test(pending: &[SubmissionRecord]) -> Vec<(TestType, usize)> {
    let mut map: HashMap<TestType, usize> = HashMap::new();
    for submission in pending {
        *map.entry(submission.test_type).or_insert(0) += 1;
    }

    let mut counts: Vec<(TestType, usize)> = map.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    counts
}

pub fn build_report(
    generated_at: DateTime<Utc>,
    summaries: &[CohortSummary],
    ranked: &[AthleteScore],
    pending: &[SubmissionRecord],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Fitness Cohort Report");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Approved Cohorts");

    if summaries.is_empty() {
        let _ = writeln!(output, "No approved submissions yet.");
    } else {
        for summary in summaries {
            let _ = writeln!(
                output,
                "- {} ({}): {} approved, mean {:.1}, best {:.1}",
                summary.test_type.display_name(),
                summary.gender,
                summary.approved_count,
                summary.mean_result,
                summary.best_result
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Athlete Rankings");

    let scored: Vec<&AthleteScore> = ranked.iter().filter(|a| a.scored_tests > 0).collect();
    if scored.is_empty() {
        let _ = writeln!(output, "No athletes with approved, scored tests.");
    } else {
        for athlete in scored.iter().take(10) {
            let rank = athlete
                .rank
                .map(|rank| rank.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "{}. {} ({}, {}) overall {:.0}",
                rank, athlete.athlete_name, athlete.athlete_email, athlete.gender, athlete.overall_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Review Queue");

    if pending.is_empty() {
        let _ = writeln!(output, "Nothing awaiting review.");
    } else {
        let noun = if pending.len() == 1 { "submission" } else { "submissions" };
        let _ = writeln!(output, "{} {noun} awaiting review:", pending.len());
        for (test_type, count) in pending_by_test(pending) {
            let _ = writeln!(output, "- {}: {}", test_type.display_name(), count);
        }
    }

    output
}
