// src/matching/engine.rs - Orchestrates blocked pairwise comparison over the
// registrant population and emits review candidates.
//
// Three modes share one scan loop: full-population fuzzy matching, strong
// identifier conflicts, and batch-scoped detection for incoming uploads. All
// of them are idempotent with respect to the seen-pairs invariant: re-running
// detection never produces a second candidate for a pair already queued or
// decided.

use indicatif::ProgressBar;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::embedding::EmbeddingBackend;
use crate::matching::blocking::BlockingIndex;
use crate::matching::scoring::SimilarityScorer;
use crate::models::core::{
    Audience, DetectionMethod, NewReviewCandidate, Registrant, ReviewCandidate, SuggestedAction,
};
use crate::models::stats_models::DetectionStats;
use crate::normalize::comparison_context;
use crate::store::{CandidateStore, MatchingError, PersonStore, PopulationFilter};
use crate::utils::logging::MatchingLogger;

/// Caller-facing knobs for a full-population detection run.
#[derive(Debug, Clone, Default)]
pub struct DetectionFilters {
    pub audience: Option<Audience>,
    pub year: Option<i32>,
    /// Cap on scored pairs. `None` falls back to the configured pair limit.
    pub limit: Option<usize>,
    /// Pairs to skip before scoring resumes. Only meaningful when the
    /// population is unchanged since the run that returned it.
    pub resume_offset: usize,
}

struct ScanOptions {
    method: DetectionMethod,
    /// Cap on scored pairs. `None` scans everything; batch mode relies on
    /// this since it has no resume cursor and must cover the whole upload.
    limit: Option<usize>,
    resume_offset: usize,
    /// When set, at least one side of every scored pair must be in this
    /// index set (batch-scoped mode).
    restrict_to: Option<HashSet<usize>>,
}

pub struct DuplicateDetectionEngine {
    persons: Arc<dyn PersonStore>,
    candidates: Arc<dyn CandidateStore>,
    scorer: SimilarityScorer,
    embedding_backend: Arc<dyn EmbeddingBackend>,
    semantic_enabled: bool,
}

impl DuplicateDetectionEngine {
    pub fn new(
        persons: Arc<dyn PersonStore>,
        candidates: Arc<dyn CandidateStore>,
        scorer: SimilarityScorer,
        embedding_backend: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        // Availability is decided once here, not probed per call.
        let semantic_enabled = embedding_backend.is_available();
        if !semantic_enabled {
            info!("Embedding backend unavailable; detection runs text-only");
        }
        Self {
            persons,
            candidates,
            scorer,
            embedding_backend,
            semantic_enabled,
        }
    }

    /// Blocked fuzzy/semantic detection over the filtered population.
    pub async fn find_duplicates(
        &self,
        filters: &DetectionFilters,
        progress: Option<ProgressBar>,
    ) -> Result<DetectionStats, MatchingError> {
        let logger = MatchingLogger::new(DetectionMethod::NameFuzzy);
        logger.log_start(self.semantic_enabled);

        let population = self
            .persons
            .query_population(&PopulationFilter {
                audience: filters.audience,
                year: filters.year,
                event_id: None,
            })
            .await?;
        logger.log_data_loaded(population.len());

        let options = ScanOptions {
            method: DetectionMethod::NameFuzzy,
            limit: Some(filters.limit.unwrap_or(self.scorer.config().pair_limit)),
            resume_offset: filters.resume_offset,
            restrict_to: None,
        };
        self.scan_population(&logger, &population, options, progress)
            .await
    }

    /// Records sharing the same national identifier but diverging normalized
    /// names are always flagged at a fixed maximal similarity: identifier
    /// equality is ground truth and overrides every fuzzy signal. Blocking is
    /// bypassed entirely; only the cross-audience partition still applies,
    /// since a candidate carries a single audience. Grouping is cheap, so the
    /// mode takes no limit or resume cursor and `resume_offset` stays zero.
    pub async fn find_identifier_conflicts(&self) -> Result<DetectionStats, MatchingError> {
        let logger = MatchingLogger::new(DetectionMethod::StrongIdentifier);
        logger.log_start(false);

        let population = self
            .persons
            .query_population(&PopulationFilter::default())
            .await?;
        logger.log_data_loaded(population.len());

        let mut stats = DetectionStats {
            total_registrants: population.len(),
            exhausted: true,
            ..Default::default()
        };

        let mut seen_pairs = self.candidates.existing_pairs().await?;
        logger.log_existing_pairs(seen_pairs.len());

        let mut by_identifier: HashMap<&str, Vec<&Registrant>> = HashMap::new();
        for registrant in &population {
            if let Some(id_number) = registrant.national_id.as_deref() {
                if !id_number.trim().is_empty() {
                    by_identifier.entry(id_number).or_default().push(registrant);
                }
            }
        }

        let mut new_candidates = Vec::new();
        for group in by_identifier.values() {
            if group.len() < 2 {
                continue;
            }
            for i in 0..group.len() {
                for j in (i + 1)..group.len() {
                    let (left, right) = (group[i], group[j]);

                    if left.audience != right.audience {
                        continue;
                    }
                    if left.normalized_full_name == right.normalized_full_name {
                        continue;
                    }
                    let pair_key = ReviewCandidate::pair_key(&left.id, &right.id);
                    if seen_pairs.contains(&pair_key) {
                        continue;
                    }

                    stats.pairs_processed += 1;
                    stats.candidates_found += 1;
                    seen_pairs.insert(pair_key);
                    new_candidates.push(NewReviewCandidate::new(
                        &left.id,
                        &right.id,
                        left.audience,
                        &comparison_context(&left.normalized_full_name, &left.career_normalized),
                        &comparison_context(&right.normalized_full_name, &right.career_normalized),
                        crate::config::STRONG_IDENTIFIER_SIMILARITY,
                        DetectionMethod::StrongIdentifier,
                        SuggestedAction::ManualReview,
                    ));
                }
            }
        }

        stats.candidates_added = self.candidates.insert_candidates(&new_candidates).await?;
        logger.log_completion(
            stats.candidates_found,
            stats.candidates_added,
            stats.pairs_processed,
            stats.pair_errors,
        );
        Ok(stats)
    }

    /// Compares an incoming upload batch against itself and against the
    /// existing population of the same logical event, so duplicates inside a
    /// single CSV are caught before they reach the wider pool. Not subject to
    /// the pair limit: upload sizes are caller-controlled and the mode has no
    /// resume cursor, so a capped scan could leave pairs unreachable.
    pub async fn find_batch_duplicates(
        &self,
        batch_ids: &[String],
        event_id: Option<&str>,
    ) -> Result<DetectionStats, MatchingError> {
        let logger = MatchingLogger::new(DetectionMethod::BatchScoped);
        logger.log_start(self.semantic_enabled);

        let batch_id_set: HashSet<&str> = batch_ids.iter().map(|s| s.as_str()).collect();

        let mut population: Vec<Registrant> = Vec::new();
        for id in batch_ids {
            match self.persons.get_registrant(id).await? {
                Some(registrant) if registrant.row_valid && registrant.is_normalized() => {
                    population.push(registrant)
                }
                Some(_) => {}
                None => return Err(MatchingError::not_found("registrant", id.clone())),
            }
        }
        let batch_len = population.len();

        if let Some(event) = event_id {
            let pool = self
                .persons
                .query_population(&PopulationFilter {
                    event_id: Some(event.to_string()),
                    ..Default::default()
                })
                .await?;
            population.extend(
                pool.into_iter()
                    .filter(|r| !batch_id_set.contains(r.id.as_str())),
            );
        }
        logger.log_data_loaded(population.len());

        let restrict_to: HashSet<usize> = (0..batch_len).collect();
        let options = ScanOptions {
            method: DetectionMethod::BatchScoped,
            limit: None,
            resume_offset: 0,
            restrict_to: Some(restrict_to),
        };
        self.scan_population(&logger, &population, options, None)
            .await
    }

    /// Shared scan loop: blocking buckets, seen-pairs check, scoring, batch
    /// insert. A failure scoring one pair is counted and skipped, never
    /// aborts the run.
    async fn scan_population(
        &self,
        logger: &MatchingLogger,
        population: &[Registrant],
        options: ScanOptions,
        progress: Option<ProgressBar>,
    ) -> Result<DetectionStats, MatchingError> {
        let mut stats = DetectionStats {
            total_registrants: population.len(),
            resume_offset: options.resume_offset,
            exhausted: true,
            ..Default::default()
        };

        if population.len() < 2 {
            logger.log_completion(0, 0, 0, 0);
            return Ok(stats);
        }

        let mut seen_pairs = self.candidates.existing_pairs().await?;
        logger.log_existing_pairs(seen_pairs.len());

        let embeddings = self.compute_embeddings(population).await;

        let index = BlockingIndex::build(population);
        logger.log_buckets(index.bucket_count());

        let limit = options.limit.unwrap_or(usize::MAX);
        let contexts: Vec<String> = population
            .iter()
            .map(|r| comparison_context(&r.normalized_full_name, &r.career_normalized))
            .collect();

        let mut new_candidates: Vec<NewReviewCandidate> = Vec::new();
        let mut examined: usize = 0;

        for (i, j) in index.candidate_pairs() {
            examined += 1;
            if examined <= options.resume_offset {
                continue;
            }
            if stats.pairs_processed >= limit {
                // Partial result: the caller resumes from `resume_offset`.
                stats.exhausted = false;
                examined -= 1;
                break;
            }
            if let Some(pb) = &progress {
                pb.inc(1);
            }

            let (left, right) = (&population[i], &population[j]);
            if let Some(restrict) = &options.restrict_to {
                if !restrict.contains(&i) && !restrict.contains(&j) {
                    continue;
                }
            }
            if left.id == right.id {
                continue;
            }
            // Buckets do not encode the year; enforce agreement here. A
            // missing year on either side never blocks the pair.
            if let (Some(y1), Some(y2)) = (left.year, right.year) {
                if y1 != y2 {
                    continue;
                }
            }

            let pair_key = ReviewCandidate::pair_key(&left.id, &right.id);
            if seen_pairs.contains(&pair_key) {
                continue;
            }

            stats.pairs_processed += 1;

            let same_career = left.career_normalized.trim().to_lowercase()
                == right.career_normalized.trim().to_lowercase();
            let (embedding_left, embedding_right) = match &embeddings {
                Some(vectors) => (vectors[i].as_deref(), vectors[j].as_deref()),
                None => (None, None),
            };

            let score = match self.scorer.score(
                &contexts[i],
                &contexts[j],
                same_career,
                embedding_left,
                embedding_right,
            ) {
                Ok(score) => score,
                Err(e) => {
                    logger.log_warning(&format!(
                        "Scoring pair ({}, {}) failed: {}",
                        left.id, right.id, e
                    ));
                    stats.pair_errors += 1;
                    continue;
                }
            };

            if score.flagged {
                stats.candidates_found += 1;
                seen_pairs.insert(pair_key);
                new_candidates.push(NewReviewCandidate::new(
                    &left.id,
                    &right.id,
                    left.audience,
                    &contexts[i],
                    &contexts[j],
                    score.similarity,
                    options.method,
                    score.suggested_action,
                ));
            }
        }

        stats.resume_offset = examined;
        stats.candidates_added = self.candidates.insert_candidates(&new_candidates).await?;

        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        logger.log_completion(
            stats.candidates_found,
            stats.candidates_added,
            stats.pairs_processed,
            stats.pair_errors,
        );
        Ok(stats)
    }

    /// Batched embedding computation for a whole population. Failure here is
    /// a degradation, not an error: the run falls back to text-only scoring.
    async fn compute_embeddings(
        &self,
        population: &[Registrant],
    ) -> Option<Vec<Option<Vec<f32>>>> {
        if !self.semantic_enabled {
            return None;
        }
        let contexts: Vec<String> = population
            .iter()
            .map(|r| comparison_context(&r.normalized_full_name, &r.career_normalized))
            .collect();
        match self.embedding_backend.encode_batch(&contexts).await {
            Ok(vectors) if vectors.len() == population.len() => {
                Some(vectors.into_iter().map(Some).collect())
            }
            Ok(vectors) => {
                warn!(
                    "Embedding backend returned {} vectors for {} contexts; ignoring semantic signal",
                    vectors.len(),
                    population.len()
                );
                None
            }
            Err(e) => {
                warn!("Embedding computation failed, continuing text-only: {}", e);
                None
            }
        }
    }
}
