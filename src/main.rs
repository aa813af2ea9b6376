use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod error;
mod models;
mod percentile;
mod report;
mod review;
mod score;

use crate::models::{Gender, NewSubmission, ResultUnit, SubmissionStatus, TestType};
use crate::review::ReviewDecision;
use crate::score::WeightTable;

#[derive(Parser)]
#[command(name = "fitness-ranking")]
#[command(about = "Fitness test submissions, official review and cohort percentiles", long_about = None)]
struct Cli {
    /// JSON weight table for overall scores ({"vertical-jump": 0.15, ...})
    #[arg(long, global = true, env = "FITNESS_WEIGHTS")]
    weights: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample athletes and submissions
    Seed,
    /// Import athletes and submissions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a new pending test submission
    Submit {
        #[arg(long)]
        email: String,
        #[arg(long)]
        test: TestType,
        #[arg(long, allow_negative_numbers = true)]
        result: f64,
        #[arg(long)]
        unit: ResultUnit,
        #[arg(long)]
        source_key: Option<String>,
    },
    /// Approve, reject or flag a submission
    Review {
        #[arg(long)]
        submission: Uuid,
        #[arg(long)]
        decision: ReviewDecision,
        #[arg(long)]
        reviewer: String,
        #[arg(long)]
        comments: Option<String>,
    },
    /// Raise a flag on a submission
    Flag {
        #[arg(long)]
        submission: Uuid,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        official: String,
    },
    /// Recompute cached percentiles for approved cohorts
    Recompute {
        #[arg(long)]
        test: Option<TestType>,
        #[arg(long)]
        gender: Option<Gender>,
    },
    /// Recompute and show an athlete's overall score
    Score {
        #[arg(long)]
        email: String,
    },
    /// Best approved results for a cohort
    Leaderboard {
        #[arg(long)]
        test: TestType,
        #[arg(long)]
        gender: Gender,
        #[arg(long, default_value_t = 10)]
        limit: i64,
        #[arg(long)]
        json: bool,
    },
    /// Submissions awaiting review
    Pending {
        #[arg(long, default_value_t = 25)]
        limit: i64,
        #[arg(long)]
        json: bool,
    },
    /// Status history of a submission
    History {
        #[arg(long)]
        submission: Uuid,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let weights = match &cli.weights {
        Some(path) => {
            let table = WeightTable::from_json_path(path)?;
            log::info!(
                "using weight table {} (total weight {:.2})",
                path.display(),
                table.total()
            );
            table
        }
        None => WeightTable::standard(),
    };

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            let cohorts = recompute_all(&pool, None, None, &weights).await?;
            println!("Seed data inserted; {cohorts} cohorts ranked.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            for (test_type, gender) in &summary.approved_cohorts {
                review::recompute_cohort(&pool, *test_type, *gender, &weights).await?;
            }
            println!(
                "Inserted {} submissions from {}; {} cohorts re-ranked.",
                summary.inserted,
                csv.display(),
                summary.approved_cohorts.len()
            );
        }
        Commands::Submit {
            email,
            test,
            result,
            unit,
            source_key,
        } => {
            let submission = NewSubmission {
                athlete_email: email,
                test_type: test,
                result,
                result_unit: unit,
                source_key,
            };
            match review::record_submission(&pool, &submission).await? {
                Some(id) => println!("Submission {id} recorded as pending."),
                None => println!("Submission already recorded."),
            }
        }
        Commands::Review {
            submission,
            decision,
            reviewer,
            comments,
        } => {
            let outcome = review::apply_decision(
                &pool,
                submission,
                decision,
                &reviewer,
                comments.as_deref(),
                &weights,
            )
            .await?;
            println!(
                "Submission {} moved from {} to {}.",
                outcome.submission_id, outcome.previous, outcome.status
            );
            if let Some(percentile) = outcome.percentile {
                println!("Percentile: {percentile:.0}");
            }
            if let Some(overall) = outcome.overall_score {
                println!("Athlete overall score: {overall:.0}");
            }
        }
        Commands::Flag {
            submission,
            reason,
            official,
        } => {
            let outcome =
                review::flag_submission(&pool, submission, &reason, &official, &weights).await?;
            println!("Submission {} is {}.", outcome.submission_id, outcome.status);
            if let Some(overall) = outcome.overall_score {
                println!("Athlete overall score: {overall:.0}");
            }
        }
        Commands::Recompute { test, gender } => {
            let cohorts = recompute_all(&pool, test, gender, &weights).await?;
            println!("Recomputed {cohorts} cohorts.");
        }
        Commands::Score { email } => {
            let (athlete_id, _) = db::find_athlete(&pool, &email)
                .await?
                .with_context(|| format!("no athlete registered as {email}"))?;
            let overall = review::refresh_overall_score(&pool, athlete_id, &weights).await?;
            let mut percentiles: Vec<(TestType, f64)> =
                db::best_percentiles(&pool, athlete_id).await?.into_iter().collect();
            percentiles.sort_by_key(|(test, _)| *test);

            println!("Overall score for {email}: {overall:.0}");
            for (test, percentile) in percentiles {
                match weights.weight(test) {
                    Some(weight) => println!(
                        "- {}: percentile {percentile:.0} (weight {weight:.2})",
                        test.display_name()
                    ),
                    None => println!(
                        "- {}: percentile {percentile:.0} (not weighted)",
                        test.display_name()
                    ),
                }
            }
        }
        Commands::Leaderboard {
            test,
            gender,
            limit,
            json,
        } => {
            let entries = db::fetch_leaderboard(&pool, test, gender, limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No approved {} results for {gender}.", test.display_name());
                return Ok(());
            }

            println!("{} leaderboard ({gender}):", test.display_name());
            for (index, entry) in entries.iter().enumerate() {
                let percentile = entry
                    .percentile
                    .map(|p| format!("{p:.0}"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}. {} {} (percentile {})",
                    index + 1,
                    entry.athlete_name,
                    entry.result_display(),
                    percentile
                );
            }
        }
        Commands::Pending { limit, json } => {
            let pending =
                db::fetch_submissions(&pool, Some(SubmissionStatus::Pending), limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&pending)?);
                return Ok(());
            }

            if pending.is_empty() {
                println!("Nothing awaiting review.");
                return Ok(());
            }

            println!("{} submissions awaiting review:", pending.len());
            for submission in &pending {
                println!(
                    "- {} {} {} ({}) submitted {}",
                    submission.id,
                    submission.athlete_name,
                    submission.test_type.display_name(),
                    submission.result_display(),
                    submission.submitted_at.format("%Y-%m-%d")
                );
            }
        }
        Commands::History { submission } => {
            let changes = db::fetch_status_history(&pool, submission).await?;
            if changes.is_empty() {
                println!("No history for {submission}.");
                return Ok(());
            }
            for change in changes {
                println!(
                    "- {} {} by {}{}",
                    change.changed_at.format("%Y-%m-%d %H:%M"),
                    change.status,
                    change.changed_by.as_deref().unwrap_or("athlete"),
                    change
                        .reason
                        .map(|reason| format!(": {reason}"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Report { out } => {
            let summaries = db::fetch_cohort_summaries(&pool).await?;
            let ranked = score::rank_athletes(db::fetch_athlete_scores(&pool, None).await?);
            let pending =
                db::fetch_submissions(&pool, Some(SubmissionStatus::Pending), i64::MAX).await?;
            let report = report::build_report(chrono::Utc::now(), &summaries, &ranked, &pending);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

/// Recomputes every (test, gender) cohort matching the optional filters.
async fn recompute_all(
    pool: &sqlx::PgPool,
    test: Option<TestType>,
    gender: Option<Gender>,
    weights: &WeightTable,
) -> anyhow::Result<usize> {
    let genders = [Gender::Male, Gender::Female, Gender::Other];
    let mut cohorts = 0;

    for test_type in TestType::all().iter().filter(|t| test.map_or(true, |wanted| wanted == **t)) {
        for cohort_gender in genders.iter().filter(|g| gender.map_or(true, |wanted| wanted == **g)) {
            let members = review::recompute_cohort(pool, *test_type, *cohort_gender, weights).await?;
            if members > 0 {
                cohorts += 1;
            }
        }
    }

    Ok(cohorts)
}
