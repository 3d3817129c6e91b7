// src/store/mod.rs - Storage seams for the detection and review pipeline.
//
// The core is storage-agnostic: the engine and review service only talk to
// these traits. `memory` backs tests and small one-off runs, `postgres` is the
// production implementation.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

use crate::models::core::{
    Audience, NewReviewCandidate, Registrant, ReviewCandidate, ReviewDecision, ReviewStatus,
};
use crate::models::stats_models::QueueStats;

/// Typed failures surfaced to callers. Storage-level trouble is wrapped in
/// `Storage` with context; everything else maps to a specific caller mistake.
#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("candidate {id} already decided (status: {status})")]
    InvalidTransition { id: String, status: ReviewStatus },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl MatchingError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        MatchingError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Filters applied when loading the detection population.
#[derive(Debug, Clone, Default)]
pub struct PopulationFilter {
    pub audience: Option<Audience>,
    pub year: Option<i32>,
    /// Restrict to a single logical event (batch-scoped detection).
    pub event_id: Option<String>,
}

/// Status filter for queue listing: a concrete status or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Only(ReviewStatus),
}

impl std::str::FromStr for StatusFilter {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            Ok(StatusFilter::All)
        } else {
            Ok(StatusFilter::Only(s.parse()?))
        }
    }
}

/// Normalization fields computed by the backfill pass for one registrant.
#[derive(Debug, Clone)]
pub struct NormalizationUpdate {
    pub id: String,
    pub raw_full_name: String,
    pub normalized_full_name: String,
    pub canonical_full_name: String,
    pub career_normalized: String,
    pub audience: Audience,
}

/// Everything the review service needs to apply in one transaction: the
/// status transition plus (on accept) the canonical name relabeling.
#[derive(Debug, Clone)]
pub struct DecisionWrite {
    pub candidate_id: String,
    pub decision: ReviewDecision,
    pub decided_by: String,
    /// Present iff the decision is an accept.
    pub canonical_name: Option<String>,
    /// Which of the pair becomes the authoritative record. Required on accept.
    pub canonical_record_id: Option<String>,
}

#[async_trait]
pub trait PersonStore: Send + Sync {
    async fn get_registrant(&self, id: &str) -> Result<Option<Registrant>, MatchingError>;

    /// All valid, normalized registrants matching the filter. This is the
    /// detection population; rows failing upstream validation never appear.
    async fn query_population(
        &self,
        filter: &PopulationFilter,
    ) -> Result<Vec<Registrant>, MatchingError>;

    /// Registrants whose normalization fields have not been populated yet.
    async fn query_unnormalized(&self) -> Result<Vec<Registrant>, MatchingError>;

    /// Applies a backfill batch atomically. Returns the number of rows updated.
    async fn apply_normalization(
        &self,
        updates: &[NormalizationUpdate],
    ) -> Result<usize, MatchingError>;

    async fn count_registrants(&self) -> Result<(usize, usize), MatchingError>;
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn get_candidate(&self, id: &str) -> Result<Option<ReviewCandidate>, MatchingError>;

    /// Sorted id tuples of every candidate ever created, decided or not.
    /// The engine consults this before scoring; the store must additionally
    /// enforce the invariant itself (a unique index in Postgres) so that two
    /// concurrent detection runs cannot double-insert.
    async fn existing_pairs(&self) -> Result<HashSet<(String, String)>, MatchingError>;

    /// Inserts candidates, silently skipping pairs that already exist.
    /// Returns how many were actually added.
    async fn insert_candidates(
        &self,
        candidates: &[NewReviewCandidate],
    ) -> Result<usize, MatchingError>;

    /// Paginated listing ordered by similarity descending, then creation time
    /// ascending: most confident, oldest-unresolved first.
    async fn list_candidates(
        &self,
        status: StatusFilter,
        audience: Option<Audience>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewCandidate>, usize), MatchingError>;

    /// Applies a decision atomically: status transition, decision metadata,
    /// and (on accept) both registrants' canonical names. Must re-check the
    /// pending status inside the transaction and fail with `InvalidTransition`
    /// if another reviewer got there first.
    async fn apply_decision(
        &self,
        write: &DecisionWrite,
    ) -> Result<ReviewCandidate, MatchingError>;

    async fn queue_stats(&self) -> Result<QueueStats, MatchingError>;
}
