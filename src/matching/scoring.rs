// src/matching/scoring.rs - Fuzzy and semantic similarity over comparison
// contexts, combined into a duplicate verdict.

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

use crate::config::MatchingConfig;
use crate::models::core::SuggestedAction;
use crate::store::MatchingError;
use crate::utils::candle::cosine_similarity_candle;

/// Everything the engine needs to know about one scored pair.
#[derive(Debug, Clone)]
pub struct PairScore {
    /// Token-set fuzzy similarity over the two contexts, 0-100.
    pub text_similarity: f64,
    /// Cosine similarity of the context embeddings, 0-1, when both sides had
    /// a vector available.
    pub semantic_similarity: Option<f64>,
    /// What gets stored on the candidate: max of text and scaled semantic,
    /// so ranking always reflects the strongest signal found.
    pub similarity: f64,
    /// True when either signal cleared its review threshold (union, not
    /// intersection, to maximize recall for human review).
    pub flagged: bool,
    pub suggested_action: SuggestedAction,
}

/// Simple 0-100 edit ratio between two strings.
fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

fn token_set(s: &str) -> BTreeSet<String> {
    s.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Order-independent token overlap similarity, 0-100. Mirrors the classic
/// token_set_ratio: compare the sorted intersection against each side's
/// sorted intersection-plus-remainder and take the best of the three ratios,
/// so duplicated or reordered words do not drag the score down.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    if a.trim().is_empty() || b.trim().is_empty() {
        return 0.0;
    }

    let tokens_a = token_set(a);
    let tokens_b = token_set(b);

    let intersection: Vec<&String> = tokens_a.intersection(&tokens_b).collect();
    let diff_a: Vec<&String> = tokens_a.difference(&tokens_b).collect();
    let diff_b: Vec<&String> = tokens_b.difference(&tokens_a).collect();

    let joined = |tokens: &[&String]| {
        tokens
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    };

    let sect = joined(&intersection);
    let combined_a = joined(&[intersection.as_slice(), diff_a.as_slice()].concat());
    let combined_b = joined(&[intersection.as_slice(), diff_b.as_slice()].concat());

    ratio(&sect, &combined_a)
        .max(ratio(&sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

/// Threshold-driven scorer. Thresholds arrive through `MatchingConfig` so
/// boundary values can be tested deterministically.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    config: MatchingConfig,
}

impl SimilarityScorer {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Scores one pair of contexts. Embeddings are optional and precomputed
    /// by the caller (encoding is batched per detection run, never per pair);
    /// without them the scorer degrades to text-only without error.
    pub fn score(
        &self,
        context1: &str,
        context2: &str,
        same_career: bool,
        embedding1: Option<&[f32]>,
        embedding2: Option<&[f32]>,
    ) -> Result<PairScore, MatchingError> {
        let text_similarity = token_set_ratio(context1, context2);

        let semantic_similarity = match (embedding1, embedding2) {
            (Some(e1), Some(e2)) => Some(cosine_similarity_candle(e1, e2)?),
            _ => None,
        };

        let semantic_scaled = semantic_similarity.map(|s| s * 100.0).unwrap_or(0.0);
        let similarity = text_similarity.max(semantic_scaled);

        let flagged = text_similarity >= self.config.manual_review_threshold
            || semantic_similarity
                .map(|s| s >= self.config.semantic_threshold)
                .unwrap_or(false);

        let suggested_action =
            if text_similarity >= self.config.auto_accept_threshold && same_career {
                SuggestedAction::AutoAccept
            } else {
                SuggestedAction::ManualReview
            };

        Ok(PairScore {
            text_similarity,
            semantic_similarity,
            similarity,
            flagged,
            suggested_action,
        })
    }
}
