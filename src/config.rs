// src/config.rs - Threshold configuration for scoring and detection.
//
// Every similarity threshold is a named constructor input rather than a
// literal buried in the comparison loop, so boundary values can be exercised
// deterministically in tests.

use log::{debug, info};
use std::env;

/// Text similarity (0-100) above which a pair is queued for manual review.
pub const DEFAULT_MANUAL_REVIEW_THRESHOLD: f64 = 88.0;
/// Text similarity (0-100) above which, combined with identical careers, a
/// pair is labeled auto-acceptable. The label never bypasses review.
pub const DEFAULT_AUTO_ACCEPT_THRESHOLD: f64 = 96.0;
/// Cosine similarity (0-1) above which the semantic signal alone queues a pair.
pub const DEFAULT_SEMANTIC_THRESHOLD: f64 = 0.60;
/// Similarity recorded for strong-identifier conflicts. Identifier equality is
/// ground truth, so these rank above every fuzzy candidate.
pub const STRONG_IDENTIFIER_SIMILARITY: f64 = 100.0;
/// Default cap on pairs examined per detection run.
pub const DEFAULT_PAIR_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub manual_review_threshold: f64,
    pub auto_accept_threshold: f64,
    pub semantic_threshold: f64,
    pub pair_limit: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            manual_review_threshold: DEFAULT_MANUAL_REVIEW_THRESHOLD,
            auto_accept_threshold: DEFAULT_AUTO_ACCEPT_THRESHOLD,
            semantic_threshold: DEFAULT_SEMANTIC_THRESHOLD,
            pair_limit: DEFAULT_PAIR_LIMIT,
        }
    }
}

impl MatchingConfig {
    /// Reads thresholds from the environment, falling back to the defaults.
    pub fn from_env() -> Self {
        let config = Self {
            manual_review_threshold: parse_env_f64(
                "MANUAL_REVIEW_THRESHOLD",
                DEFAULT_MANUAL_REVIEW_THRESHOLD,
            ),
            auto_accept_threshold: parse_env_f64(
                "AUTO_ACCEPT_THRESHOLD",
                DEFAULT_AUTO_ACCEPT_THRESHOLD,
            ),
            semantic_threshold: parse_env_f64("SEMANTIC_THRESHOLD", DEFAULT_SEMANTIC_THRESHOLD),
            pair_limit: parse_env_usize("DETECTION_PAIR_LIMIT", DEFAULT_PAIR_LIMIT),
        };
        debug!("Matching config loaded: {:?}", config);
        config
    }

    pub fn log_config(&self) {
        info!(
            "Thresholds: manual review >= {:.1}, auto-accept >= {:.1} (same career), semantic >= {:.2}, pair limit {}",
            self.manual_review_threshold,
            self.auto_accept_threshold,
            self.semantic_threshold,
            self.pair_limit
        );
    }
}

fn parse_env_f64(var: &str, default: f64) -> f64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

fn parse_env_usize(var: &str, default: usize) -> usize {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchingConfig::default();
        assert_eq!(config.manual_review_threshold, 88.0);
        assert_eq!(config.auto_accept_threshold, 96.0);
        assert_eq!(config.semantic_threshold, 0.60);
        assert_eq!(config.pair_limit, 1000);
    }
}
