// src/models/core.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::store::MatchingError;

/// Business segmentation of registrants. Doubles as a hard partition during
/// duplicate detection: candidates are never generated across audiences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Audience {
    Student,
    Staff,
}

impl Audience {
    /// Wire/storage representation, kept in Spanish to match the ingestion data.
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Student => "estudiantes",
            Audience::Staff => "colaboradores",
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "estudiantes" => Ok(Audience::Student),
            "colaboradores" => Ok(Audience::Staff),
            other => Err(MatchingError::InvalidInput(format!(
                "unknown audience '{}', expected 'estudiantes' or 'colaboradores'",
                other
            ))),
        }
    }
}

/// One raw registration row as ingested. Never deduplicated at the row level:
/// canonicalization is a labeling operation over `canonical_full_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registrant {
    pub id: String,
    /// Name exactly as received. Immutable after ingestion.
    pub raw_full_name: String,
    /// Diacritic-stripped, Spanish title-cased form of `raw_full_name`.
    /// Empty string means the backfill has not reached this record yet.
    pub normalized_full_name: String,
    /// Display name agreed during review. Initially equals the normalized name
    /// and is only mutated by accepted decisions.
    pub canonical_full_name: String,
    /// Id of the registrant chosen as the authoritative record for this
    /// person. `None` until a duplicate involving this record is accepted;
    /// points at itself when this record was chosen.
    pub canonical_record_id: Option<String>,
    pub career_raw: String,
    pub career_normalized: String,
    pub audience: Audience,
    /// National identifier (RUT). Equality of this field is treated as ground
    /// truth in the strong-identifier detection mode.
    pub national_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Set by the upstream row validator; invalid rows are never compared.
    pub row_valid: bool,
    pub event_id: Option<String>,
    pub year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Registrant {
    pub fn is_normalized(&self) -> bool {
        !self.normalized_full_name.is_empty()
    }
}

/// Which detection mode produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethod {
    /// Blocked fuzzy/semantic comparison over comparison contexts.
    NameFuzzy,
    /// Identical national id with diverging names. Overrides fuzzy signals.
    StrongIdentifier,
    /// Incoming upload batch compared against itself and the same event's pool.
    BatchScoped,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::NameFuzzy => "name_fuzzy",
            DetectionMethod::StrongIdentifier => "strong_identifier",
            DetectionMethod::BatchScoped => "batch_scoped",
        }
    }
}

/// Classification label attached to a candidate at detection time. Everything
/// still goes through human review; `AutoAccept` only marks pairs a caller may
/// choose to batch-accept explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestedAction {
    AutoAccept,
    ManualReview,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::AutoAccept => "auto_accept",
            SuggestedAction::ManualReview => "manual_review",
        }
    }
}

/// Review queue state machine: `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Accepted,
    Rejected,
    Skipped,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Accepted => "accepted",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReviewStatus::Pending)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "accepted" => Ok(ReviewStatus::Accepted),
            "rejected" => Ok(ReviewStatus::Rejected),
            "skipped" => Ok(ReviewStatus::Skipped),
            other => Err(MatchingError::InvalidInput(format!(
                "unknown review status '{}'",
                other
            ))),
        }
    }
}

/// Human decision over a pending candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewDecision {
    Accept,
    Reject,
    Skip,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Accept => "accept",
            ReviewDecision::Reject => "reject",
            ReviewDecision::Skip => "skip",
        }
    }

    pub fn resulting_status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::Accept => ReviewStatus::Accepted,
            ReviewDecision::Reject => ReviewStatus::Rejected,
            ReviewDecision::Skip => ReviewStatus::Skipped,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = MatchingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(ReviewDecision::Accept),
            "reject" => Ok(ReviewDecision::Reject),
            "skip" => Ok(ReviewDecision::Skip),
            other => Err(MatchingError::InvalidInput(format!(
                "unknown decision '{}', expected 'accept', 'reject' or 'skip'",
                other
            ))),
        }
    }
}

/// A duplicate hypothesis awaiting (or having received) a human decision.
///
/// Invariants:
/// - `left_id < right_id` (symmetric pairs collapse to one row)
/// - at most one candidate exists per unordered id pair
/// - immutable once `status` is terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCandidate {
    pub id: String,
    pub left_id: String,
    pub right_id: String,
    pub audience: Audience,
    /// `"{normalized_name} | {career}"` snapshots of what was actually compared.
    pub left_context: String,
    pub right_context: String,
    /// 0-100, the strongest signal found (max of text and scaled semantic).
    pub similarity: f64,
    pub method: DetectionMethod,
    pub suggested_action: SuggestedAction,
    pub status: ReviewStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReviewCandidate {
    /// Sorted id tuple used as the uniqueness key for the seen-pairs invariant.
    pub fn pair_key(left_id: &str, right_id: &str) -> (String, String) {
        if left_id <= right_id {
            (left_id.to_string(), right_id.to_string())
        } else {
            (right_id.to_string(), left_id.to_string())
        }
    }
}

/// A candidate as produced by the detection engine, before insertion.
#[derive(Debug, Clone)]
pub struct NewReviewCandidate {
    pub left_id: String,
    pub right_id: String,
    pub audience: Audience,
    pub left_context: String,
    pub right_context: String,
    pub similarity: f64,
    pub method: DetectionMethod,
    pub suggested_action: SuggestedAction,
}

impl NewReviewCandidate {
    /// Orders the pair so `left_id < right_id` holds regardless of the order
    /// the engine happened to visit the records in.
    pub fn new(
        id_a: &str,
        id_b: &str,
        audience: Audience,
        context_a: &str,
        context_b: &str,
        similarity: f64,
        method: DetectionMethod,
        suggested_action: SuggestedAction,
    ) -> Self {
        if id_a <= id_b {
            Self {
                left_id: id_a.to_string(),
                right_id: id_b.to_string(),
                audience,
                left_context: context_a.to_string(),
                right_context: context_b.to_string(),
                similarity,
                method,
                suggested_action,
            }
        } else {
            Self {
                left_id: id_b.to_string(),
                right_id: id_a.to_string(),
                audience,
                left_context: context_b.to_string(),
                right_context: context_a.to_string(),
                similarity,
                method,
                suggested_action,
            }
        }
    }

    pub fn pair_key(&self) -> (String, String) {
        (self.left_id.clone(), self.right_id.clone())
    }
}
