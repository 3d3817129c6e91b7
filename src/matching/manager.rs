// src/matching/manager.rs - Runs the detection modes in sequence and
// aggregates per-method outcomes into one pipeline result.

use indicatif::ProgressBar;
use std::time::Instant;
use uuid::Uuid;

use crate::matching::engine::{DetectionFilters, DuplicateDetectionEngine};
use crate::models::core::DetectionMethod;
use crate::models::stats_models::MethodOutcome;
use crate::store::MatchingError;
use crate::utils::logging::{log_pipeline_completion, log_pipeline_method_completed, log_pipeline_start};

/// One full detection pass: fuzzy matching over the filtered population, then
/// strong-identifier conflicts over everything. The identifier mode is cheap
/// (grouping, no scoring), so it is not subject to the pair limit.
pub async fn run_detection_pipeline(
    engine: &DuplicateDetectionEngine,
    filters: &DetectionFilters,
    progress: Option<ProgressBar>,
) -> Result<Vec<MethodOutcome>, MatchingError> {
    let run_id = Uuid::new_v4().to_string();
    let pipeline_start = Instant::now();
    log_pipeline_start(&run_id, 2);

    let mut outcomes = Vec::with_capacity(2);

    let method_start = Instant::now();
    let stats = engine.find_duplicates(filters, progress).await?;
    let elapsed_secs = method_start.elapsed().as_secs_f64();
    log_pipeline_method_completed(DetectionMethod::NameFuzzy, elapsed_secs, &stats);
    outcomes.push(MethodOutcome {
        method: DetectionMethod::NameFuzzy,
        stats,
        elapsed_secs,
    });

    let method_start = Instant::now();
    let stats = engine.find_identifier_conflicts().await?;
    let elapsed_secs = method_start.elapsed().as_secs_f64();
    log_pipeline_method_completed(DetectionMethod::StrongIdentifier, elapsed_secs, &stats);
    outcomes.push(MethodOutcome {
        method: DetectionMethod::StrongIdentifier,
        stats,
        elapsed_secs,
    });

    log_pipeline_completion(&run_id, pipeline_start.elapsed().as_secs_f64(), &outcomes);
    Ok(outcomes)
}
