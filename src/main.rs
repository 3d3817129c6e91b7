use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dedupe_lib::config::MatchingConfig;
use dedupe_lib::embedding::backend_from_env;
use dedupe_lib::matching::engine::{DetectionFilters, DuplicateDetectionEngine};
use dedupe_lib::matching::manager::run_detection_pipeline;
use dedupe_lib::matching::scoring::SimilarityScorer;
use dedupe_lib::models::core::{Audience, ReviewDecision};
use dedupe_lib::review::{DecisionRequest, ReviewService};
use dedupe_lib::store::postgres::PgMatchStore;
use dedupe_lib::store::StatusFilter;
use dedupe_lib::utils::db_connect::connect;
use dedupe_lib::backfill_normalization;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "dedupe", about = "Duplicate detection and review for event registrants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Populate normalization fields for registrants that lack them
    Backfill,
    /// Run the detection pipeline and queue review candidates
    Detect {
        /// Restrict to one audience: estudiantes or colaboradores
        #[arg(long)]
        audience: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        /// Cap on scored pairs for this run
        #[arg(long)]
        limit: Option<usize>,
        /// Resume offset returned by a previous limited run
        #[arg(long, default_value_t = 0)]
        resume: usize,
    },
    /// List the review queue
    Queue {
        /// pending, accepted, rejected, skipped or all
        #[arg(long, default_value = "pending")]
        status: String,
        #[arg(long)]
        audience: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Decide one pending candidate
    Decide {
        /// Candidate id
        #[arg(long)]
        id: String,
        /// accept, reject or skip
        #[arg(long)]
        decision: String,
        #[arg(long)]
        decided_by: String,
        /// Required on accept
        #[arg(long)]
        canonical_name: Option<String>,
        /// Required on accept: one of the pair's registrant ids
        #[arg(long)]
        canonical_record_id: Option<String>,
    },
    /// Print queue and normalization statistics
    Stats,
}

fn parse_audience(value: Option<&str>) -> Result<Option<Audience>> {
    value.map(|v| v.parse::<Audience>()).transpose().map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let pool = connect().await.context("Failed to connect to database")?;
    let store = Arc::new(PgMatchStore::new(pool));
    let config = MatchingConfig::from_env();
    config.log_config();

    match cli.command {
        Command::Backfill => {
            let stats = backfill_normalization(store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Detect {
            audience,
            year,
            limit,
            resume,
        } => {
            let embedding_backend = backend_from_env().await;
            let engine = DuplicateDetectionEngine::new(
                store.clone(),
                store.clone(),
                SimilarityScorer::new(config.clone()),
                embedding_backend,
            );
            let filters = DetectionFilters {
                audience: parse_audience(audience.as_deref())?,
                year,
                limit,
                resume_offset: resume,
            };

            let pair_cap = limit.unwrap_or(config.pair_limit) as u64;
            let progress = ProgressBar::new(pair_cap);
            progress.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                    )
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            progress.set_message("Scoring candidate pairs...");

            let outcomes = run_detection_pipeline(&engine, &filters, Some(progress)).await?;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
        }
        Command::Queue {
            status,
            audience,
            page,
            limit,
        } => {
            let review = ReviewService::new(store.clone(), store.clone());
            let status: StatusFilter = status.parse()?;
            let queue = review
                .list_queue(status, parse_audience(audience.as_deref())?, page, limit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&queue)?);
        }
        Command::Decide {
            id,
            decision,
            decided_by,
            canonical_name,
            canonical_record_id,
        } => {
            let review = ReviewService::new(store.clone(), store.clone());
            let decision: ReviewDecision = decision.parse()?;
            let outcome = review
                .decide(DecisionRequest {
                    candidate_id: id,
                    decision,
                    decided_by,
                    canonical_name,
                    canonical_record_id,
                })
                .await?;
            info!(
                "Candidate {} is now {}",
                outcome.candidate.id, outcome.candidate.status
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Stats => {
            let review = ReviewService::new(store.clone(), store.clone());
            let stats = review.queue_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!(
                "Review completion: {:.1}% | Normalization: {:.1}%",
                stats.completion_percentage(),
                stats.normalization_percentage()
            );
        }
    }

    Ok(())
}
