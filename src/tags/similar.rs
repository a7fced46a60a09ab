//! Name similarity for tag deduplication hints
//!
//! Character-trigram Jaccard similarity with an edit-distance tie-break.
//! Short names fall back to bigrams so two-character CJK tags still
//! produce a signal.

use std::collections::HashSet;

/// Similarity in [0, 1]; 1.0 means identical after lowercasing
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let n = if a.chars().count() < 3 || b.chars().count() < 3 {
        2
    } else {
        3
    };
    let grams_a = ngrams(&a, n);
    let grams_b = ngrams(&b, n);
    if grams_a.is_empty() || grams_b.is_empty() {
        return 0.0;
    }

    let intersection = grams_a.intersection(&grams_b).count() as f64;
    let union = grams_a.union(&grams_b).count() as f64;
    intersection / union
}

fn ngrams(s: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < n {
        let mut set = HashSet::new();
        set.insert(s.to_string());
        return set;
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

/// Levenshtein edit distance over characters
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_names() {
        assert_eq!(name_similarity("rust", "Rust"), 1.0);
    }

    #[test]
    fn test_close_names_score_high() {
        let score = name_similarity("javascript", "javascripts");
        assert!(score > 0.6, "got {}", score);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let score = name_similarity("rust", "cooking");
        assert!(score < 0.2, "got {}", score);
    }

    #[test]
    fn test_short_cjk_names() {
        let score = name_similarity("前端", "前端开发");
        assert!(score > 0.0, "got {}", score);
    }

    #[test]
    fn test_empty_name() {
        assert_eq!(name_similarity("", "rust"), 0.0);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }
}
