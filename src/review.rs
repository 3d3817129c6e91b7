// src/review.rs - Human review queue over duplicate candidates.
//
// Decisions are terminal and atomic: the candidate transition plus the
// canonical-name relabeling of both registrants commit together or not at
// all. Accepting never deletes or merges rows; it only assigns the agreed
// canonical identity, preserving the raw audit history.

use futures::future;
use log::info;
use serde::Serialize;
use std::sync::Arc;

use crate::models::core::{Audience, Registrant, ReviewCandidate, ReviewDecision};
use crate::models::stats_models::QueueStats;
use crate::store::{CandidateStore, DecisionWrite, MatchingError, PersonStore, StatusFilter};

/// A queue entry joined with both registrants, as reviewers see it.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueueItem {
    pub candidate: ReviewCandidate,
    pub left_registrant: Registrant,
    pub right_registrant: Registrant,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueuePage {
    pub items: Vec<ReviewQueueItem>,
    pub total_count: usize,
    pub page: usize,
    pub limit: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Caller's decision over one pending candidate.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub candidate_id: String,
    pub decision: ReviewDecision,
    pub decided_by: String,
    /// Required on accept: the agreed display name for both records.
    pub canonical_name: Option<String>,
    /// Required on accept: which of the pair is the authoritative record.
    pub canonical_record_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub candidate: ReviewCandidate,
    /// Ids whose `canonical_full_name` was rewritten (both, on accept).
    pub updated_registrants: Vec<String>,
}

pub struct ReviewService {
    persons: Arc<dyn PersonStore>,
    candidates: Arc<dyn CandidateStore>,
}

impl ReviewService {
    pub fn new(persons: Arc<dyn PersonStore>, candidates: Arc<dyn CandidateStore>) -> Self {
        Self {
            persons,
            candidates,
        }
    }

    /// Paginated queue listing, most confident and oldest-unresolved first.
    /// Pages are 1-based. Entries whose registrants vanished are dropped from
    /// the page rather than failing the whole listing.
    pub async fn list_queue(
        &self,
        status: StatusFilter,
        audience: Option<Audience>,
        page: usize,
        limit: usize,
    ) -> Result<QueuePage, MatchingError> {
        if page == 0 {
            return Err(MatchingError::InvalidInput(
                "page numbers are 1-based".to_string(),
            ));
        }
        if limit == 0 || limit > 100 {
            return Err(MatchingError::InvalidInput(
                "limit must be between 1 and 100".to_string(),
            ));
        }

        let offset = (page - 1) * limit;
        let (candidates, total_count) = self
            .candidates
            .list_candidates(status, audience, offset, limit)
            .await?;

        let mut items = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let (left, right) = future::try_join(
                self.persons.get_registrant(&candidate.left_id),
                self.persons.get_registrant(&candidate.right_id),
            )
            .await?;
            if let (Some(left_registrant), Some(right_registrant)) = (left, right) {
                items.push(ReviewQueueItem {
                    candidate,
                    left_registrant,
                    right_registrant,
                });
            }
        }

        Ok(QueuePage {
            items,
            total_count,
            page,
            limit,
            has_next: offset + limit < total_count,
            has_prev: page > 1,
        })
    }

    /// Applies a decision. Validation happens before any mutation; the store
    /// re-checks the pending status inside its transaction, so a concurrent
    /// decision surfaces as `InvalidTransition` rather than an overwrite.
    pub async fn decide(&self, request: DecisionRequest) -> Result<DecisionOutcome, MatchingError> {
        if request.decided_by.trim().is_empty() {
            return Err(MatchingError::InvalidInput(
                "decided_by must not be empty".to_string(),
            ));
        }

        let candidate = self
            .candidates
            .get_candidate(&request.candidate_id)
            .await?
            .ok_or_else(|| MatchingError::not_found("review candidate", &request.candidate_id))?;

        if candidate.status.is_terminal() {
            return Err(MatchingError::InvalidTransition {
                id: candidate.id,
                status: candidate.status,
            });
        }

        let (canonical_name, canonical_record_id) = match request.decision {
            ReviewDecision::Accept => {
                let name = request
                    .canonical_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| {
                        MatchingError::InvalidInput(
                            "canonical_name is required when accepting a duplicate".to_string(),
                        )
                    })?;
                let record_id = request.canonical_record_id.as_deref().ok_or_else(|| {
                    MatchingError::InvalidInput(
                        "canonical_record_id is required when accepting a duplicate".to_string(),
                    )
                })?;
                if record_id != candidate.left_id && record_id != candidate.right_id {
                    return Err(MatchingError::InvalidInput(format!(
                        "canonical_record_id {} is not part of candidate {}",
                        record_id, candidate.id
                    )));
                }
                (Some(name.to_string()), Some(record_id.to_string()))
            }
            // Reject/skip only touch status and decision metadata.
            _ => (None, None),
        };

        let decided = self
            .candidates
            .apply_decision(&DecisionWrite {
                candidate_id: candidate.id.clone(),
                decision: request.decision,
                decided_by: request.decided_by.clone(),
                canonical_name,
                canonical_record_id,
            })
            .await?;

        let updated_registrants = if request.decision == ReviewDecision::Accept {
            vec![decided.left_id.clone(), decided.right_id.clone()]
        } else {
            Vec::new()
        };

        info!(
            "Review decision '{}' applied to candidate {} by {}",
            request.decision.as_str(),
            decided.id,
            request.decided_by
        );

        Ok(DecisionOutcome {
            candidate: decided,
            updated_registrants,
        })
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, MatchingError> {
        let (mut stats, (total, normalized)) = future::try_join(
            self.candidates.queue_stats(),
            self.persons.count_registrants(),
        )
        .await?;
        stats.registrants_total = total;
        stats.registrants_normalized = normalized;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{DetectionMethod, NewReviewCandidate, ReviewStatus, SuggestedAction};
    use crate::store::memory::MemoryStore;

    async fn service_with_candidate() -> (ReviewService, String) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_candidates(&[NewReviewCandidate::new(
                "a",
                "b",
                Audience::Student,
                "maria | derecho",
                "marla | derecho",
                91.0,
                DetectionMethod::NameFuzzy,
                SuggestedAction::ManualReview,
            )])
            .await
            .unwrap();
        let (page, _) = store
            .list_candidates(StatusFilter::All, None, 0, 1)
            .await
            .unwrap();
        let id = page[0].id.clone();
        (ReviewService::new(store.clone(), store), id)
    }

    #[tokio::test]
    async fn test_accept_requires_canonical_fields() {
        let (service, id) = service_with_candidate().await;

        let base = DecisionRequest {
            candidate_id: id.clone(),
            decision: ReviewDecision::Accept,
            decided_by: "ana".to_string(),
            canonical_name: None,
            canonical_record_id: Some("a".to_string()),
        };
        assert!(matches!(
            service.decide(base.clone()).await.unwrap_err(),
            MatchingError::InvalidInput(_)
        ));

        // Whitespace-only names do not count.
        let blank_name = DecisionRequest {
            canonical_name: Some("   ".to_string()),
            ..base.clone()
        };
        assert!(service.decide(blank_name).await.is_err());

        // The canonical record must be one of the pair.
        let foreign_record = DecisionRequest {
            canonical_name: Some("Maria".to_string()),
            canonical_record_id: Some("z".to_string()),
            ..base
        };
        assert!(matches!(
            service.decide(foreign_record).await.unwrap_err(),
            MatchingError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_reject_needs_no_canonical_fields() {
        let (service, id) = service_with_candidate().await;
        let outcome = service
            .decide(DecisionRequest {
                candidate_id: id,
                decision: ReviewDecision::Reject,
                decided_by: "ana".to_string(),
                canonical_name: None,
                canonical_record_id: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.candidate.status, ReviewStatus::Rejected);
        assert!(outcome.updated_registrants.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_candidate_is_not_found() {
        let (service, _) = service_with_candidate().await;
        let err = service
            .decide(DecisionRequest {
                candidate_id: "nope".to_string(),
                decision: ReviewDecision::Skip,
                decided_by: "ana".to_string(),
                canonical_name: None,
                canonical_record_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_queue_pagination_bounds() {
        let (service, _) = service_with_candidate().await;
        assert!(service
            .list_queue(StatusFilter::All, None, 0, 10)
            .await
            .is_err());
        assert!(service
            .list_queue(StatusFilter::All, None, 1, 0)
            .await
            .is_err());

        let page = service
            .list_queue(StatusFilter::All, None, 1, 10)
            .await
            .unwrap();
        // The registrants behind the pair are absent from the store, so the
        // entry is dropped while the total still counts it.
        assert_eq!(page.total_count, 1);
        assert!(page.items.is_empty());
        assert!(!page.has_next);
    }
}
