//! Direction-aware percentile of a result within its approved cohort.

use crate::models::TestType;

/// Percentile reported when no approved cohort exists.
pub const NEUTRAL_PERCENTILE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortStanding {
    pub total_count: usize,
    pub better_count: usize,
    pub percentile: f64,
}

/// Counts cohort results strictly better than `target` for this test.
pub fn count_better(test_type: TestType, target: f64, cohort: &[f64]) -> usize {
    let direction = test_type.direction();
    cohort
        .iter()
        .filter(|&&candidate| direction.is_better(candidate, target))
        .count()
}

/// Ranks `target` against the approved results of its (test, gender) cohort.
///
/// `cohort` is whatever population the caller fetched; the calculator does not
/// filter it further. A non-finite target yields a NaN percentile, which the
/// caller is expected to reject.
pub fn calculate_standing(test_type: TestType, target: f64, cohort: &[f64]) -> CohortStanding {
    let total_count = cohort.len();
    let better_count = count_better(test_type, target, cohort);

    let percentile = if !target.is_finite() {
        f64::NAN
    } else if total_count == 0 {
        NEUTRAL_PERCENTILE
    } else {
        let raw = (total_count - better_count) as f64 / total_count as f64 * 100.0;
        raw.round().clamp(0.0, 100.0)
    };

    CohortStanding {
        total_count,
        better_count,
        percentile,
    }
}

/// Standing of every cohort member against the rest of the cohort.
///
/// Output is in input order. Used when the cohort changes and every cached
/// percentile in it goes stale.
pub fn standings(test_type: TestType, results: &[f64]) -> Vec<CohortStanding> {
    let mut others = Vec::with_capacity(results.len().saturating_sub(1));
    results
        .iter()
        .enumerate()
        .map(|(index, &target)| {
            others.clear();
            others.extend(
                results
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| *other != index)
                    .map(|(_, value)| *value),
            );
            calculate_standing(test_type, target, &others)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculate_percentile(test_type: TestType, target: f64, cohort: &[f64]) -> f64 {
        calculate_standing(test_type, target, cohort).percentile
    }

    #[test]
    fn empty_cohort_defaults_to_neutral() {
        for target in [0.0, 12.5, -4.0, 1_000.0] {
            assert_eq!(calculate_percentile(TestType::SitUps, target, &[]), 50.0);
            assert_eq!(calculate_percentile(TestType::ShuttleRun, target, &[]), 50.0);
        }
    }

    #[test]
    fn shuttle_run_counts_lower_times_as_better() {
        let standing = calculate_standing(TestType::ShuttleRun, 11.0, &[10.0, 11.0, 12.0]);
        assert_eq!(standing.better_count, 1);
        assert_eq!(standing.total_count, 3);
        assert_eq!(standing.percentile, 67.0);
    }

    #[test]
    fn vertical_jump_counts_higher_results_as_better() {
        let standing = calculate_standing(TestType::VerticalJump, 50.0, &[40.0, 50.0, 60.0]);
        assert_eq!(standing.better_count, 1);
        assert_eq!(standing.total_count, 3);
        assert_eq!(standing.percentile, 67.0);
    }

    #[test]
    fn ties_do_not_change_better_count() {
        let cohort = vec![40.0, 55.0, 60.0];
        let before = count_better(TestType::BroadJump, 55.0, &cohort);

        let mut with_tie = cohort.clone();
        with_tie.push(55.0);
        let after = count_better(TestType::BroadJump, 55.0, &with_tie);

        assert_eq!(before, after);
        assert_eq!(
            calculate_percentile(TestType::BroadJump, 55.0, &with_tie),
            75.0
        );
    }

    #[test]
    fn improving_result_never_lowers_percentile() {
        let cohort = [8.0, 9.5, 10.0, 10.0, 11.2, 12.0, 13.7];

        let mut previous = f64::MIN;
        for step in 0..40 {
            let jump = step as f64 * 0.5;
            let percentile = calculate_percentile(TestType::VerticalJump, jump, &cohort);
            assert!(percentile >= previous, "jump {jump}");
            previous = percentile;
        }

        let mut previous = f64::MIN;
        for step in 0..40 {
            let time = 20.0 - step as f64 * 0.5;
            let percentile = calculate_percentile(TestType::ShuttleRun, time, &cohort);
            assert!(percentile >= previous, "time {time}");
            previous = percentile;
        }
    }

    #[test]
    fn percentile_stays_within_bounds() {
        let cohort = [1.0, 2.0, 3.0];
        for target in [-100.0, 0.0, 1.5, 3.0, 100.0] {
            for test in TestType::all() {
                let percentile = calculate_percentile(*test, target, &cohort);
                assert!((0.0..=100.0).contains(&percentile), "{test} {target}");
            }
        }
        assert_eq!(calculate_percentile(TestType::PushUps, -1.0, &cohort), 0.0);
        assert_eq!(calculate_percentile(TestType::PushUps, 99.0, &cohort), 100.0);
    }

    #[test]
    fn non_finite_target_yields_nan() {
        assert!(calculate_percentile(TestType::Balance, f64::NAN, &[1.0]).is_nan());
        assert!(calculate_percentile(TestType::Balance, f64::NAN, &[]).is_nan());
    }

    #[test]
    fn standings_exclude_each_member_from_its_own_cohort() {
        let ranked = standings(TestType::ShuttleRun, &[10.0, 11.0, 12.0]);
        let percentiles: Vec<f64> = ranked.iter().map(|s| s.percentile).collect();
        assert_eq!(percentiles, vec![100.0, 50.0, 0.0]);
        assert!(ranked.iter().all(|s| s.total_count == 2));

        let single = standings(TestType::SitUps, &[30.0]);
        assert_eq!(single[0].percentile, 50.0);
    }
}
