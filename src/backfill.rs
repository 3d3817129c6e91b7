// src/backfill.rs - Normalization backfill over already-ingested registrants.
//
// Idempotent: only rows with an empty `normalized_full_name` are selected, so
// re-running after a partial failure picks up where the last run stopped.

use log::{info, warn};

use crate::models::stats_models::BackfillStats;
use crate::normalize::{classify_audience, normalize_career, normalize_full_name};
use crate::store::{MatchingError, NormalizationUpdate, PersonStore};

const BACKFILL_BATCH_SIZE: usize = 500;

/// Computes and persists the derived fields for every unnormalized registrant.
/// Records with a blank raw name cannot be normalized and are counted as
/// errors rather than aborting the pass.
pub async fn backfill_normalization(
    store: &dyn PersonStore,
) -> Result<BackfillStats, MatchingError> {
    let pending = store.query_unnormalized().await?;
    let mut stats = BackfillStats {
        total_processed: pending.len(),
        ..Default::default()
    };

    if pending.is_empty() {
        info!("Backfill: nothing to normalize");
        return Ok(stats);
    }
    info!("Backfill: normalizing {} registrants", pending.len());

    let mut batch: Vec<NormalizationUpdate> = Vec::with_capacity(BACKFILL_BATCH_SIZE);
    for registrant in &pending {
        let raw_name = registrant.raw_full_name.trim();
        if raw_name.is_empty() {
            warn!("Backfill: registrant {} has no name, skipping", registrant.id);
            stats.errors += 1;
            continue;
        }

        let normalized = normalize_full_name(raw_name);
        // The canonical name starts as the normalized form and only changes
        // when a reviewer accepts a duplicate involving this record.
        let canonical = if registrant.canonical_full_name.is_empty() {
            normalized.clone()
        } else {
            registrant.canonical_full_name.clone()
        };

        let career_normalized = normalize_career(&registrant.career_raw);
        batch.push(NormalizationUpdate {
            id: registrant.id.clone(),
            raw_full_name: raw_name.to_string(),
            normalized_full_name: normalized,
            canonical_full_name: canonical,
            audience: classify_audience(&career_normalized, &registrant.career_raw),
            career_normalized,
        });

        if batch.len() >= BACKFILL_BATCH_SIZE {
            stats.updated += store.apply_normalization(&batch).await?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        stats.updated += store.apply_normalization(&batch).await?;
    }

    info!(
        "Backfill complete: {} processed, {} updated, {} errors",
        stats.total_processed, stats.updated, stats.errors
    );
    Ok(stats)
}
