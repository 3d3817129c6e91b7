pub mod core;
pub mod stats_models;

pub use self::core::{
    Audience, DetectionMethod, Registrant, ReviewCandidate, ReviewDecision, ReviewStatus,
    SuggestedAction,
};
pub use stats_models::{BackfillStats, DetectionStats, MethodOutcome, QueueStats};
