//! Trail name normalization and similarity.
//!
//! Two similarity measures are used for different jobs:
//! - [`trigram_similarity`] decides whether a TNM and an OSM trail are the same
//!   trail (Jaccard over padded word trigrams).
//! - [`match_similarity`] scores a user-supplied location name against a trail
//!   name, after dropping words like "trail" that carry no signal.

use std::collections::HashSet;

/// Words that appear in most trail names and say nothing about which trail it is.
const NOISE_WORDS: &[&str] = &[
    "trail", "trails", "trailhead", "path", "paths", "walk", "walks",
];

/// Floor applied when one cleaned name contains the other.
const CONTAINMENT_SCORE: f64 = 0.8;

/// Grouping key for trail fragments: trim, collapse internal whitespace, lowercase.
///
/// ```
/// use trailmatch::names::normalize_name;
/// assert_eq!(normalize_name("  Jordan   Pond Path "), "jordan pond path");
/// ```
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Clean a name for point matching: lowercase, punctuation removed, noise words
/// dropped as whole words.
pub fn preprocess_name(name: &str) -> String {
    let stripped: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    stripped
        .split_whitespace()
        .filter(|word| !NOISE_WORDS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity between a location name and a trail name in [0, 1].
///
/// Empty names (after cleaning) score 0. When one cleaned name contains the
/// other the score is at least 0.8.
pub fn match_similarity(location_name: &str, trail_name: &str) -> f64 {
    let a = preprocess_name(location_name);
    let b = preprocess_name(trail_name);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let score = strsim::normalized_levenshtein(&a, &b);
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        score.max(CONTAINMENT_SCORE)
    } else {
        score
    }
}

fn trigrams(text: &str) -> HashSet<[char; 3]> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.to_lowercase().chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            set.insert([window[0], window[1], window[2]]);
        }
    }
    set
}

/// Trigram similarity with PostgreSQL `pg_trgm` semantics.
///
/// Each lowercase alphanumeric word is padded with two leading spaces and one
/// trailing space; the result is the Jaccard index of the two trigram sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    let union = ta.len() + tb.len() - shared;
    shared as f64 / union as f64
}
