//! Request normalization and similarity scoring
//!
//! Scoring is a Jaccard index over unique words, boosted when both requests
//! start with the same word (the verb usually carries the intent):
//!
//! ```text
//! score = 0.4 + 0.6 * jaccard   if first words match
//! score = jaccard               otherwise
//! ```

use std::collections::HashSet;

/// Base score granted when both requests share their first word
const INTENT_BASE: f64 = 0.4;

/// Weight of the Jaccard component when the intent matches
const INTENT_WEIGHT: f64 = 0.6;

/// Lowercase, collapse whitespace runs to one space, trim.
pub fn normalize(request: &str) -> String {
    request
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words of the normalized request, in order
pub fn tokenize(request: &str) -> Vec<String> {
    normalize(request)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Similarity between two requests in `[0.0, 1.0]`.
///
/// Symmetric, and `similarity(s, s) == 1.0` for every `s`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let norm_a = normalize(a);
    let norm_b = normalize(b);

    if norm_a == norm_b {
        return 1.0;
    }

    let words_a: Vec<&str> = norm_a.split_whitespace().collect();
    let words_b: Vec<&str> = norm_b.split_whitespace().collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = words_a.iter().copied().collect();
    let set_b: HashSet<&str> = words_b.iter().copied().collect();

    let common = set_a.intersection(&set_b).count();
    let total = set_a.len() + set_b.len() - common;
    let jaccard = if total > 0 {
        common as f64 / total as f64
    } else {
        0.0
    };

    if words_a[0] == words_b[0] {
        INTENT_BASE + INTENT_WEIGHT * jaccard
    } else {
        jaccard
    }
}
