// src/lib.rs - Duplicate detection and review pipeline for event registrants.

pub mod backfill;
pub mod config;
pub mod embedding;
pub mod matching;
pub mod models;
pub mod normalize;
pub mod review;
pub mod store;
pub mod utils;

pub use backfill::backfill_normalization;
pub use config::MatchingConfig;
pub use matching::engine::{DetectionFilters, DuplicateDetectionEngine};
pub use matching::manager::run_detection_pipeline;
pub use normalize::{classify_audience, comparison_context, normalize_full_name};
pub use review::{DecisionRequest, ReviewService};
pub use store::{MatchingError, PersonStore};
