// src/matching/blocking.rs - Cheap comparison keys that prune the candidate
// space before any similarity scoring.
//
// A pair survives blocking only when both registrants share the audience and
// both name initials. This bounds comparisons to the size of each bucket
// instead of the full cross product, at the documented cost of missing
// duplicates whose first letters were mis-transcribed.

use std::collections::BTreeMap;

use crate::models::core::{Audience, Registrant};
use crate::normalize::is_connector_word;

/// First-word initial and last-significant-word initial of a normalized name.
/// The last significant word is the last one that is not a connector word, so
/// "Juan de la Cruz" blocks on ('J', 'C').
pub fn extract_name_initials(normalized_name: &str) -> (String, String) {
    let parts: Vec<&str> = normalized_name.split_whitespace().collect();
    let Some(first) = parts.first() else {
        return (String::new(), String::new());
    };

    let first_initial = first
        .chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_default();

    let mut last_initial = String::new();
    if parts.len() > 1 {
        for word in parts[1..].iter().rev() {
            if !is_connector_word(&word.to_lowercase()) {
                last_initial = word
                    .chars()
                    .next()
                    .map(|c| c.to_uppercase().to_string())
                    .unwrap_or_default();
                break;
            }
        }
    }

    (first_initial, last_initial)
}

/// Blocking predicate. Symmetric in its two sides; cross-audience pairs are
/// rejected outright (explicit scope limitation, not a bug), and years must
/// agree when both are known.
pub fn should_compare(
    name1: &str,
    name2: &str,
    audience1: Audience,
    audience2: Audience,
    year1: Option<i32>,
    year2: Option<i32>,
) -> bool {
    if audience1 != audience2 {
        return false;
    }

    let (first1, last1) = extract_name_initials(name1);
    let (first2, last2) = extract_name_initials(name2);
    if first1 != first2 || last1 != last2 {
        return false;
    }

    if let (Some(y1), Some(y2)) = (year1, year2) {
        if y1 != y2 {
            return false;
        }
    }

    true
}

/// Bucket key: every pair that can possibly survive `should_compare` shares
/// this key, so pair generation only ever looks inside one bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockingKey {
    pub audience: Audience,
    pub first_initial: String,
    pub last_initial: String,
}

/// Index from blocking key to record positions, built once per detection run.
/// A BTreeMap keeps bucket iteration deterministic, which the resumption
/// cursor of limited runs relies on.
pub struct BlockingIndex {
    buckets: BTreeMap<BlockingKey, Vec<usize>>,
}

impl BlockingIndex {
    pub fn build(registrants: &[Registrant]) -> Self {
        let mut buckets: BTreeMap<BlockingKey, Vec<usize>> = BTreeMap::new();
        for (idx, registrant) in registrants.iter().enumerate() {
            let (first_initial, last_initial) =
                extract_name_initials(&registrant.normalized_full_name);
            if first_initial.is_empty() {
                continue;
            }
            buckets
                .entry(BlockingKey {
                    audience: registrant.audience,
                    first_initial,
                    last_initial,
                })
                .or_default()
                .push(idx);
        }
        Self { buckets }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Unordered index pairs within each bucket, in a stable global order.
    pub fn candidate_pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.buckets.values().flat_map(|members| {
            members.iter().enumerate().flat_map(move |(i, &a)| {
                members[i + 1..].iter().map(move |&b| (a, b))
            })
        })
    }
}
