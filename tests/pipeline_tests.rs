// End-to-end pipeline tests over the in-memory store: backfill, detection,
// review decisions and canonicalization, without a database or an embedding
// service.

use chrono::Utc;
use std::sync::Arc;

use dedupe_lib::backfill::backfill_normalization;
use dedupe_lib::config::MatchingConfig;
use dedupe_lib::embedding::DisabledEmbeddingBackend;
use dedupe_lib::matching::engine::{DetectionFilters, DuplicateDetectionEngine};
use dedupe_lib::matching::manager::run_detection_pipeline;
use dedupe_lib::matching::scoring::SimilarityScorer;
use dedupe_lib::models::core::{Audience, DetectionMethod, Registrant, ReviewDecision, ReviewStatus};
use dedupe_lib::normalize::{classify_audience, normalize_full_name};
use dedupe_lib::review::{DecisionRequest, ReviewService};
use dedupe_lib::store::memory::MemoryStore;
use dedupe_lib::store::{MatchingError, PersonStore, StatusFilter};

fn raw_registrant(id: &str, name: &str, career: &str) -> Registrant {
    Registrant {
        id: id.to_string(),
        raw_full_name: name.to_string(),
        normalized_full_name: String::new(),
        canonical_full_name: String::new(),
        canonical_record_id: None,
        career_raw: career.to_string(),
        career_normalized: String::new(),
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

fn normalized_registrant(id: &str, name: &str, career: &str) -> Registrant {
    let normalized = normalize_full_name(name);
    Registrant {
        normalized_full_name: normalized.clone(),
        canonical_full_name: normalized,
        career_normalized: career.to_string(),
        audience: classify_audience(career, career),
        ..raw_registrant(id, name, career)
    }
}

fn engine_over(store: &Arc<MemoryStore>) -> DuplicateDetectionEngine {
    DuplicateDetectionEngine::new(
        store.clone(),
        store.clone(),
        SimilarityScorer::new(MatchingConfig::default()),
        Arc::new(DisabledEmbeddingBackend),
    )
}

#[tokio::test]
async fn near_duplicate_pair_lands_in_review_queue() {
    let store = Arc::new(MemoryStore::new());
    // Same person, one row typed with accents and one without.
    store.insert_registrant(normalized_registrant(
        "r1",
        "María Pérez Soto",
        "Ingenieria Civil",
    ));
    store.insert_registrant(normalized_registrant(
        "r2",
        "Maria Perez Soto",
        "Ingenieria Civil",
    ));
    store.insert_registrant(normalized_registrant(
        "r3",
        "Pedro Gonzalez Diaz",
        "Derecho",
    ));

    let engine = engine_over(&store);
    let stats = engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();

    assert_eq!(stats.total_registrants, 3);
    assert_eq!(stats.candidates_added, 1);
    assert!(stats.exhausted);

    let review = ReviewService::new(store.clone(), store.clone());
    let page = review
        .list_queue(StatusFilter::Only(ReviewStatus::Pending), None, 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    let item = &page.items[0];
    assert_eq!(item.candidate.status, ReviewStatus::Pending);
    assert_eq!(item.candidate.method, DetectionMethod::NameFuzzy);
    // Diacritics normalize away, so the contexts are identical.
    assert!((item.candidate.similarity - 100.0).abs() < f64::EPSILON);
    assert!(item.candidate.left_id < item.candidate.right_id);
}

#[tokio::test]
async fn rerunning_detection_adds_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.insert_registrant(normalized_registrant("r1", "Maria Perez", "Derecho"));
    store.insert_registrant(normalized_registrant("r2", "Maria Peres", "Derecho"));

    let engine = engine_over(&store);
    let first = engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(first.candidates_added, 1);

    let second = engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(second.candidates_added, 0);
    assert_eq!(second.candidates_found, 0);
}

#[tokio::test]
async fn cross_audience_pairs_are_never_compared() {
    let store = Arc::new(MemoryStore::new());
    store.insert_registrant(normalized_registrant(
        "r1",
        "Maria Perez Soto",
        "Ingenieria Civil",
    ));
    // Identical name, but a staff career keyword puts this row in the other
    // audience partition.
    store.insert_registrant(normalized_registrant(
        "r2",
        "Maria Perez Soto",
        "Docente de Matematicas",
    ));

    let engine = engine_over(&store);
    let stats = engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(stats.pairs_processed, 0);
    assert_eq!(stats.candidates_added, 0);
}

#[tokio::test]
async fn accepting_relabels_both_canonical_names() {
    let store = Arc::new(MemoryStore::new());
    store.insert_registrant(normalized_registrant("r1", "Maria Perez", "Derecho"));
    store.insert_registrant(normalized_registrant("r2", "Maria Peres", "Derecho"));

    let engine = engine_over(&store);
    engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();

    let review = ReviewService::new(store.clone(), store.clone());
    let page = review
        .list_queue(StatusFilter::All, None, 1, 10)
        .await
        .unwrap();
    let candidate_id = page.items[0].candidate.id.clone();

    // Accept without a canonical record id must be refused up front.
    let err = review
        .decide(DecisionRequest {
            candidate_id: candidate_id.clone(),
            decision: ReviewDecision::Accept,
            decided_by: "ana".to_string(),
            canonical_name: Some("Maria Perez".to_string()),
            canonical_record_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::InvalidInput(_)));

    let outcome = review
        .decide(DecisionRequest {
            candidate_id: candidate_id.clone(),
            decision: ReviewDecision::Accept,
            decided_by: "ana".to_string(),
            canonical_name: Some("Maria Perez".to_string()),
            canonical_record_id: Some("r1".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(outcome.candidate.status, ReviewStatus::Accepted);
    assert_eq!(outcome.updated_registrants, vec!["r1", "r2"]);

    for id in ["r1", "r2"] {
        let registrant = store.get_registrant(id).await.unwrap().unwrap();
        assert_eq!(registrant.canonical_full_name, "Maria Perez");
        // The accepted record id is persisted as the shared person identity.
        assert_eq!(registrant.canonical_record_id.as_deref(), Some("r1"));
    }
    // The misspelled raw name survives untouched for auditing.
    let r2 = store.get_registrant("r2").await.unwrap().unwrap();
    assert_eq!(r2.raw_full_name, "Maria Peres");

    // Decisions are terminal.
    let err = review
        .decide(DecisionRequest {
            candidate_id,
            decision: ReviewDecision::Reject,
            decided_by: "ana".to_string(),
            canonical_name: None,
            canonical_record_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::InvalidTransition { .. }));
}

#[tokio::test]
async fn identifier_conflict_is_flagged_at_full_similarity() {
    let store = Arc::new(MemoryStore::new());
    let mut left = normalized_registrant("r1", "Maria Perez Soto", "Derecho");
    left.national_id = Some("12.345.678-9".to_string());
    let mut right = normalized_registrant("r2", "Mariana Paz Sandoval", "Derecho");
    right.national_id = Some("12.345.678-9".to_string());
    store.insert_registrant(left);
    store.insert_registrant(right);

    let engine = engine_over(&store);
    // The names share no blocking bucket, so fuzzy detection misses the pair.
    let fuzzy = engine
        .find_duplicates(&DetectionFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(fuzzy.candidates_added, 0);

    let stats = engine.find_identifier_conflicts().await.unwrap();
    assert_eq!(stats.candidates_added, 1);
    // No resume cursor in this mode; the offset never moves.
    assert_eq!(stats.resume_offset, 0);
    assert!(stats.exhausted);

    let review = ReviewService::new(store.clone(), store.clone());
    let page = review
        .list_queue(StatusFilter::All, None, 1, 10)
        .await
        .unwrap();
    let candidate = &page.items[0].candidate;
    assert_eq!(candidate.method, DetectionMethod::StrongIdentifier);
    assert!((candidate.similarity - 100.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn full_pipeline_runs_both_methods() {
    let store = Arc::new(MemoryStore::new());
    store.insert_registrant(normalized_registrant("r1", "Maria Perez", "Derecho"));
    store.insert_registrant(normalized_registrant("r2", "Maria Peres", "Derecho"));

    let engine = engine_over(&store);
    let outcomes = run_detection_pipeline(&engine, &DetectionFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].method, DetectionMethod::NameFuzzy);
    assert_eq!(outcomes[1].method, DetectionMethod::StrongIdentifier);
    assert_eq!(outcomes[0].stats.candidates_added, 1);
    assert_eq!(outcomes[1].stats.candidates_added, 0);
}

#[tokio::test]
async fn limited_run_resumes_where_it_stopped() {
    let store = Arc::new(MemoryStore::new());
    // Five near-identical students in one blocking bucket: ten pairs total.
    for i in 0..5 {
        store.insert_registrant(normalized_registrant(
            &format!("r{}", i),
            &format!("Maria Perez Soto{}", i),
            "Derecho",
        ));
    }

    let engine = engine_over(&store);
    let first = engine
        .find_duplicates(
            &DetectionFilters {
                limit: Some(4),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(first.pairs_processed, 4);
    assert!(!first.exhausted);

    let second = engine
        .find_duplicates(
            &DetectionFilters {
                limit: Some(100),
                resume_offset: first.resume_offset,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.pairs_processed, 6);
    assert!(second.exhausted);
    assert_eq!(
        first.candidates_added + second.candidates_added,
        10,
        "every pair in the bucket should be queued exactly once"
    );
}

#[tokio::test]
async fn batch_detection_checks_upload_against_event_pool() {
    let store = Arc::new(MemoryStore::new());
    let mut existing = normalized_registrant("pool1", "Maria Perez Soto", "Derecho");
    existing.event_id = Some("feria-2026".to_string());
    store.insert_registrant(existing);

    let mut incoming = normalized_registrant("new1", "Maria Peres Soto", "Derecho");
    incoming.event_id = Some("feria-2026".to_string());
    store.insert_registrant(incoming);

    // Unrelated upload row.
    let mut other = normalized_registrant("new2", "Pedro Gonzalez", "Derecho");
    other.event_id = Some("feria-2026".to_string());
    store.insert_registrant(other);

    let engine = engine_over(&store);
    let stats = engine
        .find_batch_duplicates(&["new1".to_string(), "new2".to_string()], Some("feria-2026"))
        .await
        .unwrap();
    assert_eq!(stats.candidates_added, 1);

    let review = ReviewService::new(store.clone(), store.clone());
    let page = review
        .list_queue(StatusFilter::All, None, 1, 10)
        .await
        .unwrap();
    assert_eq!(page.items[0].candidate.method, DetectionMethod::BatchScoped);

    // An unknown id in the batch is a hard error, not a silent skip.
    let err = engine
        .find_batch_duplicates(&["missing".to_string()], None)
        .await
        .unwrap_err();
    assert!(matches!(err, MatchingError::NotFound { .. }));
}

#[tokio::test]
async fn batch_detection_ignores_the_pair_limit() {
    let store = Arc::new(MemoryStore::new());
    // Three records in one blocking bucket; the first enumerated pair is a
    // non-duplicate, the true duplicate comes after it.
    store.insert_registrant(normalized_registrant("r1", "Maria Perez Soto", "Derecho"));
    store.insert_registrant(normalized_registrant("r2", "Mirta Paz Salinas", "Derecho"));
    store.insert_registrant(normalized_registrant("r3", "Maria Peres Soto", "Derecho"));

    let config = MatchingConfig {
        pair_limit: 1,
        ..Default::default()
    };
    let engine = DuplicateDetectionEngine::new(
        store.clone(),
        store.clone(),
        SimilarityScorer::new(config),
        Arc::new(DisabledEmbeddingBackend),
    );

    // A single run must cover the whole upload even with a tiny pair limit
    // configured, since this mode has no resume cursor.
    let stats = engine
        .find_batch_duplicates(
            &["r1".to_string(), "r2".to_string(), "r3".to_string()],
            None,
        )
        .await
        .unwrap();
    assert!(stats.exhausted);
    assert_eq!(stats.pairs_processed, 3);
    assert_eq!(stats.candidates_added, 1);

    let review = ReviewService::new(store.clone(), store.clone());
    let page = review
        .list_queue(StatusFilter::All, None, 1, 10)
        .await
        .unwrap();
    let candidate = &page.items[0].candidate;
    assert_eq!(candidate.left_id, "r1");
    assert_eq!(candidate.right_id, "r3");
}

#[tokio::test]
async fn backfill_normalizes_and_classifies() {
    let store = Arc::new(MemoryStore::new());
    store.insert_registrant(raw_registrant(
        "r1",
        "  maría   de la CRUZ  ",
        "Ingeniería Civil",
    ));
    store.insert_registrant(raw_registrant("r2", "pedro soto", "Docente de Física"));
    store.insert_registrant(raw_registrant("r3", "   ", "Derecho"));

    let stats = backfill_normalization(store.as_ref()).await.unwrap();
    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.errors, 1);

    let r1 = store.get_registrant("r1").await.unwrap().unwrap();
    assert_eq!(r1.normalized_full_name, "Maria de la Cruz");
    assert_eq!(r1.canonical_full_name, "Maria de la Cruz");
    assert_eq!(r1.audience, Audience::Student);

    let r2 = store.get_registrant("r2").await.unwrap().unwrap();
    assert_eq!(r2.audience, Audience::Staff);

    // Re-running touches nothing: normalized rows are no longer selected.
    let again = backfill_normalization(store.as_ref()).await.unwrap();
    assert_eq!(again.total_processed, 1);
    assert_eq!(again.updated, 0);

    let review = ReviewService::new(store.clone(), store.clone());
    let queue_stats = review.queue_stats().await.unwrap();
    assert_eq!(queue_stats.registrants_total, 3);
    assert_eq!(queue_stats.registrants_normalized, 2);
}
