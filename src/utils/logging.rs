// src/utils/logging.rs - Logging helpers shared by the detection modes, so
// every method reports the same phases in the same shape.

use log::{debug, info, warn};
use std::time::Instant;

use crate::models::core::DetectionMethod;
use crate::models::stats_models::{DetectionStats, MethodOutcome};

#[derive(Clone)]
pub struct MatchingLogger {
    method_name: &'static str,
    method_emoji: &'static str,
    start_time: Instant,
}

impl MatchingLogger {
    pub fn new(method: DetectionMethod) -> Self {
        let (method_name, method_emoji) = match method {
            DetectionMethod::NameFuzzy => ("NAME", "👤"),
            DetectionMethod::StrongIdentifier => ("ID", "🪪"),
            DetectionMethod::BatchScoped => ("BATCH", "📦"),
        };
        Self {
            method_name,
            method_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, semantic_enabled: bool) {
        info!(
            "[{}] {} 🚀 Starting {} detection{}",
            self.method_name,
            self.method_emoji,
            self.method_name.to_lowercase(),
            if semantic_enabled {
                " with semantic scoring"
            } else {
                " (text-only)"
            }
        );
    }

    pub fn log_data_loaded(&self, count: usize) {
        info!(
            "[{}] {} 📊 Loaded {} registrants for comparison",
            self.method_name, self.method_emoji, count
        );
    }

    pub fn log_existing_pairs(&self, count: usize) {
        if count > 0 {
            info!(
                "[{}] {} ⏭️  Found {} existing candidate pairs (will skip to avoid duplicates)",
                self.method_name, self.method_emoji, count
            );
        } else {
            info!(
                "[{}] {} ✨ No existing candidate pairs found - clean slate",
                self.method_name, self.method_emoji
            );
        }
    }

    pub fn log_buckets(&self, count: usize) {
        info!(
            "[{}] {} 🗂️  Built blocking index with {} buckets",
            self.method_name, self.method_emoji, count
        );
    }

    pub fn log_completion(&self, found: usize, added: usize, processed: usize, errors: usize) {
        let elapsed = self.start_time.elapsed();
        info!(
            "[{}] {} ✅ Completed in {:.1}s: {} pairs scored, {} candidates found, {} added, {} errors",
            self.method_name,
            self.method_emoji,
            elapsed.as_secs_f32(),
            processed,
            found,
            added,
            errors
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.method_name, self.method_emoji, message);
    }

    pub fn log_debug(&self, message: &str) {
        debug!("[{}] {} {}", self.method_name, self.method_emoji, message);
    }
}

pub fn log_pipeline_start(run_id: &str, method_count: usize) {
    info!(
        "🚀 Starting duplicate detection pipeline (run ID: {}, {} methods)",
        run_id, method_count
    );
}

pub fn log_pipeline_method_completed(
    method: DetectionMethod,
    elapsed_secs: f64,
    stats: &DetectionStats,
) {
    info!(
        "✅ Method {} finished in {:.1}s: {} candidates added ({} found, {} pairs scored)",
        method.as_str(),
        elapsed_secs,
        stats.candidates_added,
        stats.candidates_found,
        stats.pairs_processed
    );
    if !stats.exhausted {
        info!(
            "⏸️  Method {} stopped at the pair limit; resume from offset {}",
            method.as_str(),
            stats.resume_offset
        );
    }
}

pub fn log_pipeline_completion(run_id: &str, elapsed_secs: f64, outcomes: &[MethodOutcome]) {
    let total_added: usize = outcomes.iter().map(|o| o.stats.candidates_added).sum();
    let total_errors: usize = outcomes.iter().map(|o| o.stats.pair_errors).sum();
    info!(
        "🏁 Pipeline {} complete in {:.1}s: {} candidates queued for review, {} pair errors",
        run_id, elapsed_secs, total_added, total_errors
    );
}
