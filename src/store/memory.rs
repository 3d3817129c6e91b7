// src/store/memory.rs - In-memory store for tests and one-off local runs.
//
// One mutex guards both tables, which is what makes `apply_decision` atomic
// here: the status re-check and the canonical relabeling happen under a
// single lock acquisition.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::core::{
    Audience, NewReviewCandidate, Registrant, ReviewCandidate, ReviewDecision, ReviewStatus,
};
use crate::models::stats_models::QueueStats;
use crate::store::{
    CandidateStore, DecisionWrite, MatchingError, NormalizationUpdate, PersonStore,
    PopulationFilter, StatusFilter,
};

#[derive(Default)]
struct Inner {
    registrants: HashMap<String, Registrant>,
    candidates: HashMap<String, ReviewCandidate>,
    /// Mirrors the Postgres unique index on (left_id, right_id).
    pair_index: HashSet<(String, String)>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_registrant(&self, registrant: Registrant) {
        let mut inner = self.inner.lock().unwrap();
        inner.registrants.insert(registrant.id.clone(), registrant);
    }

    fn matches_filter(registrant: &Registrant, filter: &PopulationFilter) -> bool {
        if let Some(audience) = filter.audience {
            if registrant.audience != audience {
                return false;
            }
        }
        if let Some(year) = filter.year {
            if registrant.year != Some(year) {
                return false;
            }
        }
        if let Some(event_id) = &filter.event_id {
            if registrant.event_id.as_deref() != Some(event_id.as_str()) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl PersonStore for MemoryStore {
    async fn get_registrant(&self, id: &str) -> Result<Option<Registrant>, MatchingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.registrants.get(id).cloned())
    }

    async fn query_population(
        &self,
        filter: &PopulationFilter,
    ) -> Result<Vec<Registrant>, MatchingError> {
        let inner = self.inner.lock().unwrap();
        let mut population: Vec<Registrant> = inner
            .registrants
            .values()
            .filter(|r| r.row_valid && r.is_normalized() && Self::matches_filter(r, filter))
            .cloned()
            .collect();
        // Stable order so limited runs resume deterministically.
        population.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(population)
    }

    async fn query_unnormalized(&self) -> Result<Vec<Registrant>, MatchingError> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<Registrant> = inner
            .registrants
            .values()
            .filter(|r| !r.is_normalized())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(pending)
    }

    async fn apply_normalization(
        &self,
        updates: &[NormalizationUpdate],
    ) -> Result<usize, MatchingError> {
        let mut inner = self.inner.lock().unwrap();
        let mut updated = 0;
        for update in updates {
            if let Some(registrant) = inner.registrants.get_mut(&update.id) {
                registrant.raw_full_name = update.raw_full_name.clone();
                registrant.normalized_full_name = update.normalized_full_name.clone();
                registrant.canonical_full_name = update.canonical_full_name.clone();
                registrant.career_normalized = update.career_normalized.clone();
                registrant.audience = update.audience;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn count_registrants(&self) -> Result<(usize, usize), MatchingError> {
        let inner = self.inner.lock().unwrap();
        let total = inner.registrants.len();
        let normalized = inner.registrants.values().filter(|r| r.is_normalized()).count();
        Ok((total, normalized))
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn get_candidate(&self, id: &str) -> Result<Option<ReviewCandidate>, MatchingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.candidates.get(id).cloned())
    }

    async fn existing_pairs(&self) -> Result<HashSet<(String, String)>, MatchingError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.pair_index.clone())
    }

    async fn insert_candidates(
        &self,
        candidates: &[NewReviewCandidate],
    ) -> Result<usize, MatchingError> {
        let mut inner = self.inner.lock().unwrap();
        let mut added = 0;
        for new in candidates {
            let key = new.pair_key();
            if inner.pair_index.contains(&key) {
                continue;
            }
            let candidate = ReviewCandidate {
                id: Uuid::new_v4().to_string(),
                left_id: new.left_id.clone(),
                right_id: new.right_id.clone(),
                audience: new.audience,
                left_context: new.left_context.clone(),
                right_context: new.right_context.clone(),
                similarity: new.similarity,
                method: new.method,
                suggested_action: new.suggested_action,
                status: ReviewStatus::Pending,
                decided_by: None,
                decided_at: None,
                created_at: Utc::now(),
            };
            inner.pair_index.insert(key);
            inner.candidates.insert(candidate.id.clone(), candidate);
            added += 1;
        }
        Ok(added)
    }

    async fn list_candidates(
        &self,
        status: StatusFilter,
        audience: Option<Audience>,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<ReviewCandidate>, usize), MatchingError> {
        let inner = self.inner.lock().unwrap();
        let mut matching: Vec<ReviewCandidate> = inner
            .candidates
            .values()
            .filter(|c| match status {
                StatusFilter::All => true,
                StatusFilter::Only(s) => c.status == s,
            })
            .filter(|c| audience.map_or(true, |a| c.audience == a))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let total = matching.len();
        let page: Vec<ReviewCandidate> =
            matching.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn apply_decision(
        &self,
        write: &DecisionWrite,
    ) -> Result<ReviewCandidate, MatchingError> {
        let mut inner = self.inner.lock().unwrap();

        let candidate = inner
            .candidates
            .get(&write.candidate_id)
            .cloned()
            .ok_or_else(|| MatchingError::not_found("review candidate", &write.candidate_id))?;
        if candidate.status.is_terminal() {
            return Err(MatchingError::InvalidTransition {
                id: candidate.id,
                status: candidate.status,
            });
        }

        if write.decision == ReviewDecision::Accept {
            let canonical_name = write.canonical_name.as_deref().ok_or_else(|| {
                MatchingError::InvalidInput("accept requires a canonical name".to_string())
            })?;
            let canonical_record_id = write.canonical_record_id.as_deref().ok_or_else(|| {
                MatchingError::InvalidInput("accept requires a canonical record id".to_string())
            })?;
            for id in [&candidate.left_id, &candidate.right_id] {
                if let Some(registrant) = inner.registrants.get_mut(id.as_str()) {
                    registrant.canonical_full_name = canonical_name.to_string();
                    registrant.canonical_record_id = Some(canonical_record_id.to_string());
                }
            }
        }

        let stored = inner
            .candidates
            .get_mut(&write.candidate_id)
            .expect("candidate checked above");
        stored.status = write.decision.resulting_status();
        stored.decided_by = Some(write.decided_by.clone());
        stored.decided_at = Some(Utc::now());
        Ok(stored.clone())
    }

    async fn queue_stats(&self) -> Result<QueueStats, MatchingError> {
        let inner = self.inner.lock().unwrap();
        let mut stats = QueueStats::default();
        for candidate in inner.candidates.values() {
            stats.total += 1;
            match candidate.status {
                ReviewStatus::Pending => stats.pending += 1,
                ReviewStatus::Accepted => stats.accepted += 1,
                ReviewStatus::Rejected => stats.rejected += 1,
                ReviewStatus::Skipped => stats.skipped += 1,
            }
            match candidate.audience {
                Audience::Student => stats.students += 1,
                Audience::Staff => stats.staff += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{DetectionMethod, SuggestedAction};

    fn registrant(id: &str, name: &str) -> Registrant {
        Registrant {
            id: id.to_string(),
            raw_full_name: name.to_string(),
            normalized_full_name: name.to_string(),
            canonical_full_name: name.to_string(),
            canonical_record_id: None,
            career_raw: "Ingeniería Civil".to_string(),
            career_normalized: "Ingeniería Civil".to_string(),
            audience: Audience::Student,
            national_id: None,
            email: None,
            phone: None,
            row_valid: true,
            event_id: None,
            year: Some(2026),
            created_at: Utc::now(),
        }
    }

    fn candidate(left: &str, right: &str, similarity: f64) -> NewReviewCandidate {
        NewReviewCandidate::new(
            left,
            right,
            Audience::Student,
            "a | c",
            "b | c",
            similarity,
            DetectionMethod::NameFuzzy,
            SuggestedAction::ManualReview,
        )
    }

    #[tokio::test]
    async fn test_insert_skips_existing_pairs() {
        let store = MemoryStore::new();
        let added = store
            .insert_candidates(&[candidate("a", "b", 90.0)])
            .await
            .unwrap();
        assert_eq!(added, 1);

        // Same pair in the other order must collapse to the existing row.
        let added = store
            .insert_candidates(&[candidate("b", "a", 95.0)])
            .await
            .unwrap();
        assert_eq!(added, 0);
        assert_eq!(store.existing_pairs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_orders_by_similarity_then_age() {
        let store = MemoryStore::new();
        store
            .insert_candidates(&[candidate("a", "b", 90.0)])
            .await
            .unwrap();
        store
            .insert_candidates(&[candidate("c", "d", 97.0)])
            .await
            .unwrap();

        let (page, total) = store
            .list_candidates(StatusFilter::Only(ReviewStatus::Pending), None, 0, 10)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!((page[0].similarity - 97.0).abs() < f64::EPSILON);
        assert!((page[1].similarity - 90.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_accept_relabels_both_registrants() {
        let store = MemoryStore::new();
        store.insert_registrant(registrant("a", "Maria Perez"));
        store.insert_registrant(registrant("b", "Maria Peres"));
        store
            .insert_candidates(&[candidate("a", "b", 96.0)])
            .await
            .unwrap();
        let (page, _) = store
            .list_candidates(StatusFilter::All, None, 0, 10)
            .await
            .unwrap();

        let decided = store
            .apply_decision(&DecisionWrite {
                candidate_id: page[0].id.clone(),
                decision: ReviewDecision::Accept,
                decided_by: "reviewer".to_string(),
                canonical_name: Some("Maria Perez".to_string()),
                canonical_record_id: Some("a".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(decided.status, ReviewStatus::Accepted);
        assert_eq!(decided.decided_by.as_deref(), Some("reviewer"));

        let relabeled = store.get_registrant("b").await.unwrap().unwrap();
        assert_eq!(relabeled.canonical_full_name, "Maria Perez");
        // Both rows now point at the chosen authoritative record.
        assert_eq!(relabeled.canonical_record_id.as_deref(), Some("a"));
        let chosen = store.get_registrant("a").await.unwrap().unwrap();
        assert_eq!(chosen.canonical_record_id.as_deref(), Some("a"));
        // The raw name is never touched.
        assert_eq!(relabeled.raw_full_name, "Maria Peres");

        // A second decision on the same candidate must be refused.
        let err = store
            .apply_decision(&DecisionWrite {
                candidate_id: decided.id.clone(),
                decision: ReviewDecision::Reject,
                decided_by: "reviewer".to_string(),
                canonical_name: None,
                canonical_record_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MatchingError::InvalidTransition { .. }));
    }
}
