// src/models/stats_models.rs

use serde::{Deserialize, Serialize};

use super::core::DetectionMethod;

/// Structured result of one detection run. Batch operations report partial
/// failure through these counters instead of aborting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionStats {
    /// Registrants that survived the population filter.
    pub total_registrants: usize,
    /// Pairs that passed blocking and were actually scored.
    pub pairs_processed: usize,
    /// Pairs whose score cleared a review threshold.
    pub candidates_found: usize,
    /// Candidates newly persisted (existing pairs are never re-inserted).
    pub candidates_added: usize,
    /// Pairs skipped because scoring them failed.
    pub pair_errors: usize,
    /// Candidate pairs examined so far, including blocked-out ones. Pass this
    /// back as the resume offset to continue a limited run.
    pub resume_offset: usize,
    /// False when the run stopped at the pair limit before finishing.
    pub exhausted: bool,
}

/// Per-mode outcome of a full detection pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodOutcome {
    pub method: DetectionMethod,
    pub stats: DetectionStats,
    pub elapsed_secs: f64,
}

/// Result of a normalization backfill pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillStats {
    pub total_processed: usize,
    pub updated: usize,
    pub errors: usize,
}

/// Review queue totals, broken down the way reviewers triage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub students: usize,
    pub staff: usize,
    /// Registrants with normalization fields populated vs. all registrants.
    pub registrants_total: usize,
    pub registrants_normalized: usize,
}

impl QueueStats {
    pub fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.pending) as f64 / self.total as f64 * 100.0
    }

    pub fn normalization_percentage(&self) -> f64 {
        if self.registrants_total == 0 {
            return 0.0;
        }
        self.registrants_normalized as f64 / self.registrants_total as f64 * 100.0
    }
}
