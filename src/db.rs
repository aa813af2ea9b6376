use std::collections::HashMap;

use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::{
    validate_result, AthleteScore, CohortMember, CohortSummary, Direction, Gender, NewSubmission,
    ResultUnit, StatusChange, SubmissionRecord, SubmissionStatus, TestType,
};
use crate::review::FlagUpdate;
use crate::score;

const SUBMISSION_COLUMNS: &str = "s.id, s.athlete_id, a.full_name, a.email, s.test_type, \
     s.gender, s.result, s.result_unit, s.status, s.percentile, s.flags, s.submitted_at \
     FROM fitness_ranking.submissions s \
     JOIN fitness_ranking.athletes a ON a.id = s.athlete_id";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let athletes = vec![
        ("Priya Sharma", "priya.sharma@example.com", Gender::Female),
        ("Ananya Rao", "ananya.rao@example.com", Gender::Female),
        ("Rahul Verma", "rahul.verma@example.com", Gender::Male),
        ("Arjun Mehta", "arjun.mehta@example.com", Gender::Male),
    ];

    for (name, email, gender) in athletes {
        upsert_athlete(pool, name, email, gender).await?;
    }

    let submissions = vec![
        ("seed-001", "priya.sharma@example.com", TestType::VerticalJump, 48.0, ResultUnit::Cm, SubmissionStatus::Approved),
        ("seed-002", "ananya.rao@example.com", TestType::VerticalJump, 42.0, ResultUnit::Cm, SubmissionStatus::Approved),
        ("seed-003", "priya.sharma@example.com", TestType::ShuttleRun, 12.2, ResultUnit::Sec, SubmissionStatus::Approved),
        ("seed-004", "ananya.rao@example.com", TestType::ShuttleRun, 11.6, ResultUnit::Sec, SubmissionStatus::Pending),
        ("seed-005", "rahul.verma@example.com", TestType::SitUps, 45.0, ResultUnit::Reps, SubmissionStatus::Approved),
        ("seed-006", "arjun.mehta@example.com", TestType::SitUps, 38.0, ResultUnit::Reps, SubmissionStatus::Approved),
        ("seed-007", "rahul.verma@example.com", TestType::EnduranceRun, 1600.0, ResultUnit::M, SubmissionStatus::Pending),
        ("seed-008", "arjun.mehta@example.com", TestType::PushUps, 30.0, ResultUnit::Reps, SubmissionStatus::Flagged),
    ];

    for (source_key, email, test_type, result, unit, status) in submissions {
        let (athlete_id, gender) = find_athlete(pool, email)
            .await?
            .with_context(|| format!("seed athlete {email} missing"))?;
        insert_submission_row(pool, athlete_id, gender, test_type, result, unit, status, source_key)
            .await?;
    }

    Ok(())
}

pub async fn upsert_athlete(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    gender: Gender,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO fitness_ranking.athletes (id, full_name, email, gender)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, gender = EXCLUDED.gender
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(gender.as_str())
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn find_athlete(pool: &PgPool, email: &str) -> anyhow::Result<Option<(Uuid, Gender)>> {
    let row = sqlx::query("SELECT id, gender FROM fitness_ranking.athletes WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let gender: String = row.get("gender");
            Ok(Some((row.get("id"), gender.parse()?)))
        }
        None => Ok(None),
    }
}

/// Inserts a submission and its first history entry. Returns `None` when the
/// source key was already imported.
#[allow(clippy::too_many_arguments)]
async fn insert_submission_row(
    pool: &PgPool,
    athlete_id: Uuid,
    gender: Gender,
    test_type: TestType,
    result: f64,
    unit: ResultUnit,
    status: SubmissionStatus,
    source_key: &str,
) -> anyhow::Result<Option<Uuid>> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO fitness_ranking.submissions
        (id, athlete_id, test_type, gender, result, result_unit, status, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(athlete_id)
    .bind(test_type.as_str())
    .bind(gender.as_str())
    .bind(result)
    .bind(unit.as_str())
    .bind(status.as_str())
    .bind(source_key)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = inserted else {
        tx.rollback().await?;
        return Ok(None);
    };
    let id: Uuid = row.get("id");

    sqlx::query(
        r#"
        INSERT INTO fitness_ranking.status_history (id, submission_id, status)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(status.as_str())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(id))
}

pub async fn insert_submission(
    pool: &PgPool,
    submission: &NewSubmission,
) -> anyhow::Result<Option<Uuid>> {
    let (athlete_id, gender) = find_athlete(pool, &submission.athlete_email)
        .await?
        .with_context(|| format!("no athlete registered as {}", submission.athlete_email))?;

    let source_key = submission
        .source_key
        .clone()
        .unwrap_or_else(|| format!("cli-{}", Uuid::new_v4()));

    insert_submission_row(
        pool,
        athlete_id,
        gender,
        submission.test_type,
        submission.result,
        submission.result_unit,
        SubmissionStatus::Pending,
        &source_key,
    )
    .await
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub inserted: usize,
    pub approved_cohorts: Vec<(TestType, Gender)>,
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        full_name: String,
        email: String,
        gender: Gender,
        test_type: TestType,
        result: f64,
        result_unit: ResultUnit,
        status: Option<SubmissionStatus>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut summary = ImportSummary::default();

    for (line, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = record.with_context(|| format!("malformed row {}", line + 2))?;
        let result = validate_result(row.result)
            .with_context(|| format!("row {} for {}", line + 2, row.email))?;
        let status = row.status.unwrap_or(SubmissionStatus::Pending);

        let athlete_id = upsert_athlete(pool, &row.full_name, &row.email, row.gender).await?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let inserted = insert_submission_row(
            pool,
            athlete_id,
            row.gender,
            row.test_type,
            result,
            row.result_unit,
            status,
            &source_key,
        )
        .await?;

        if inserted.is_some() {
            summary.inserted += 1;
            let cohort = (row.test_type, row.gender);
            if status == SubmissionStatus::Approved && !summary.approved_cohorts.contains(&cohort) {
                summary.approved_cohorts.push(cohort);
            }
        } else {
            log::debug!("skipping already imported row {source_key}");
        }
    }

    Ok(summary)
}

fn submission_from_row(row: &PgRow) -> anyhow::Result<SubmissionRecord> {
    let test_type: String = row.get("test_type");
    let gender: String = row.get("gender");
    let result_unit: String = row.get("result_unit");
    let status: String = row.get("status");

    Ok(SubmissionRecord {
        id: row.get("id"),
        athlete_id: row.get("athlete_id"),
        athlete_name: row.get("full_name"),
        athlete_email: row.get("email"),
        test_type: test_type.parse()?,
        gender: gender.parse()?,
        result: row.get("result"),
        result_unit: result_unit.parse()?,
        status: status.parse()?,
        percentile: row.get("percentile"),
        flags: row.get("flags"),
        submitted_at: row.get("submitted_at"),
    })
}

pub async fn fetch_submission(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<SubmissionRecord>> {
    let query = format!("SELECT {SUBMISSION_COLUMNS} WHERE s.id = $1");
    let row = sqlx::query(&query).bind(id).fetch_optional(pool).await?;

    row.as_ref().map(submission_from_row).transpose()
}

pub async fn fetch_submissions(
    pool: &PgPool,
    status: Option<SubmissionStatus>,
    limit: i64,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let query = format!(
        "SELECT {SUBMISSION_COLUMNS} \
         WHERE ($1::text IS NULL OR s.status = $1) \
         ORDER BY s.submitted_at DESC LIMIT $2"
    );
    let rows = sqlx::query(&query)
        .bind(status.map(|status| status.as_str()))
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(submission_from_row).collect()
}

/// Results of the approved cohort for a test and gender, optionally leaving
/// one submission out.
pub async fn fetch_cohort_results(
    pool: &PgPool,
    test_type: TestType,
    gender: Gender,
    exclude: Option<Uuid>,
) -> anyhow::Result<Vec<f64>> {
    let rows = sqlx::query(
        r#"
        SELECT result FROM fitness_ranking.submissions
        WHERE test_type = $1 AND gender = $2 AND status = 'approved'
          AND ($3::uuid IS NULL OR id <> $3)
        "#,
    )
    .bind(test_type.as_str())
    .bind(gender.as_str())
    .bind(exclude)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(|row| row.get("result")).collect())
}

pub async fn fetch_cohort_members(
    pool: &PgPool,
    test_type: TestType,
    gender: Gender,
) -> anyhow::Result<Vec<CohortMember>> {
    let rows = sqlx::query(
        r#"
        SELECT id, athlete_id, result FROM fitness_ranking.submissions
        WHERE test_type = $1 AND gender = $2 AND status = 'approved'
        ORDER BY submitted_at
        "#,
    )
    .bind(test_type.as_str())
    .bind(gender.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| CohortMember {
            submission_id: row.get("id"),
            athlete_id: row.get("athlete_id"),
            result: row.get("result"),
        })
        .collect())
}

/// Sets a submission's status and appends the change to its history.
pub async fn update_status(
    pool: &PgPool,
    id: Uuid,
    status: SubmissionStatus,
    changed_by: Option<&str>,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    record_status_change(&mut tx, id, status, changed_by, reason).await?;
    tx.commit().await?;
    Ok(())
}

async fn record_status_change(
    conn: &mut PgConnection,
    id: Uuid,
    status: SubmissionStatus,
    changed_by: Option<&str>,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    let updated = sqlx::query(
        r#"
        UPDATE fitness_ranking.submissions
        SET status = $2,
            reviewed_by = COALESCE($3, reviewed_by),
            review_comments = COALESCE($4, review_comments),
            reviewed_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(changed_by)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("submission {id} not found");
    }

    sqlx::query(
        r#"
        INSERT INTO fitness_ranking.status_history
        (id, submission_id, status, changed_by, reason)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(status.as_str())
    .bind(changed_by)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Stores a flag raise in one transaction: the flag list and, when it moves,
/// the status with its history entry.
pub async fn write_flag_update(
    pool: &PgPool,
    id: Uuid,
    update: &FlagUpdate,
    official: &str,
    reason: &str,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE fitness_ranking.submissions SET flags = $2 WHERE id = $1")
        .bind(id)
        .bind(&update.flags)
        .execute(&mut *tx)
        .await?;

    if updated.rows_affected() == 0 {
        anyhow::bail!("submission {id} not found");
    }

    if let Some(status) = update.status {
        record_status_change(&mut tx, id, status, Some(official), Some(reason)).await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn write_percentile(pool: &PgPool, id: Uuid, percentile: f64) -> anyhow::Result<()> {
    sqlx::query("UPDATE fitness_ranking.submissions SET percentile = $2 WHERE id = $1")
        .bind(id)
        .bind(percentile)
        .execute(pool)
        .await?;
    Ok(())
}

/// Best cached percentile per test across an athlete's approved submissions.
pub async fn best_percentiles(
    pool: &PgPool,
    athlete_id: Uuid,
) -> anyhow::Result<HashMap<TestType, f64>> {
    let rows = sqlx::query(
        r#"
        SELECT test_type, MAX(percentile) AS best
        FROM fitness_ranking.submissions
        WHERE athlete_id = $1 AND status = 'approved' AND percentile IS NOT NULL
        GROUP BY test_type
        "#,
    )
    .bind(athlete_id)
    .fetch_all(pool)
    .await?;

    let mut entries: Vec<(String, f64)> = Vec::with_capacity(rows.len());
    for row in rows {
        let best: Option<f64> = row.get("best");
        if let Some(best) = best {
            entries.push((row.get("test_type"), best));
        }
    }

    Ok(score::percentile_map_from_labels(
        entries.iter().map(|(label, best)| (label.as_str(), *best)),
    ))
}

pub async fn write_overall_score(pool: &PgPool, athlete_id: Uuid, overall: f64) -> anyhow::Result<()> {
    sqlx::query("UPDATE fitness_ranking.athletes SET overall_score = $2 WHERE id = $1")
        .bind(athlete_id)
        .bind(overall)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_athlete_scores(
    pool: &PgPool,
    gender: Option<Gender>,
) -> anyhow::Result<Vec<AthleteScore>> {
    let rows = sqlx::query(
        r#"
        SELECT a.id, a.full_name, a.email, a.gender, a.overall_score,
               (
                   SELECT COUNT(*) FROM fitness_ranking.submissions s
                   WHERE s.athlete_id = a.id AND s.status = 'approved'
                     AND s.percentile IS NOT NULL
               ) AS scored_tests
        FROM fitness_ranking.athletes a
        WHERE ($1::text IS NULL OR a.gender = $1)
        "#,
    )
    .bind(gender.map(|gender| gender.as_str()))
    .fetch_all(pool)
    .await?;

    let mut athletes = Vec::with_capacity(rows.len());
    for row in rows {
        let gender: String = row.get("gender");
        athletes.push(AthleteScore {
            athlete_id: row.get("id"),
            athlete_name: row.get("full_name"),
            athlete_email: row.get("email"),
            gender: gender.parse()?,
            overall_score: row.get("overall_score"),
            scored_tests: row.get("scored_tests"),
            rank: None,
        });
    }

    Ok(athletes)
}

/// Approved submissions for one cohort, best result first.
pub async fn fetch_leaderboard(
    pool: &PgPool,
    test_type: TestType,
    gender: Gender,
    limit: i64,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let order = match test_type.direction() {
        Direction::HigherIsBetter => "DESC",
        Direction::LowerIsBetter => "ASC",
    };
    let query = format!(
        "SELECT {SUBMISSION_COLUMNS} \
         WHERE s.test_type = $1 AND s.gender = $2 AND s.status = 'approved' \
         ORDER BY s.result {order}, s.submitted_at LIMIT $3"
    );
    let rows = sqlx::query(&query)
        .bind(test_type.as_str())
        .bind(gender.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(submission_from_row).collect()
}

pub async fn fetch_cohort_summaries(pool: &PgPool) -> anyhow::Result<Vec<CohortSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT test_type, gender, COUNT(*) AS approved_count,
               AVG(result) AS mean_result, MIN(result) AS min_result, MAX(result) AS max_result
        FROM fitness_ranking.submissions
        WHERE status = 'approved'
        GROUP BY test_type, gender
        ORDER BY test_type, gender
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let test_type: TestType = row.get::<String, _>("test_type").parse()?;
        let gender: Gender = row.get::<String, _>("gender").parse()?;
        let best_result = match test_type.direction() {
            Direction::HigherIsBetter => row.get("max_result"),
            Direction::LowerIsBetter => row.get("min_result"),
        };
        summaries.push(CohortSummary {
            test_type,
            gender,
            approved_count: row.get("approved_count"),
            mean_result: row.get("mean_result"),
            best_result,
        });
    }

    Ok(summaries)
}

pub async fn fetch_status_history(pool: &PgPool, submission_id: Uuid) -> anyhow::Result<Vec<StatusChange>> {
    let rows = sqlx::query(
        r#"
        SELECT status, changed_by, reason, changed_at
        FROM fitness_ranking.status_history
        WHERE submission_id = $1
        ORDER BY changed_at
        "#,
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await?;

    let mut changes = Vec::with_capacity(rows.len());
    for row in rows {
        let status: String = row.get("status");
        changes.push(StatusChange {
            status: status.parse()?,
            changed_by: row.get("changed_by"),
            reason: row.get("reason"),
            changed_at: row.get("changed_at"),
        });
    }

    Ok(changes)
}
