//! Suggestion ranking for live-typing autocomplete
//!
//! Candidates come from search history and tag popularity. Ranking order:
//! exact prefix match first, then historical frequency, then tag
//! popularity, capped at a configurable count.

/// Build ranked suggestions for a partial query
///
/// `history` is `(query, frequency)` pairs, `tags` is `(name, usage)`
/// pairs; both are expected pre-sorted by their count descending, which
/// the store queries already guarantee.
pub fn build_suggestions(
    partial: &str,
    history: &[(String, i64)],
    tags: &[(String, i64)],
    limit: usize,
) -> Vec<String> {
    let needle = partial.trim().to_lowercase();
    let mut scored: Vec<(i64, i64, String)> = Vec::new();

    // Source rank keeps history ahead of tags at equal tier/frequency.
    for (source_rank, pool) in [(0i64, history), (1i64, tags)] {
        for (text, count) in pool {
            let lower = text.to_lowercase();
            let tier = if needle.is_empty() || lower.starts_with(&needle) {
                0
            } else if lower.contains(&needle) {
                1
            } else {
                continue;
            };
            scored.push((tier * 2 + source_rank, -count, text.clone()));
        }
    }

    scored.sort();

    let mut out: Vec<String> = Vec::new();
    for (_, _, text) in scored {
        if !out.iter().any(|s| s.eq_ignore_ascii_case(&text)) {
            out.push(text);
        }
        if out.len() >= limit {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<(String, i64)> {
        vec![
            ("rust async".to_string(), 12),
            ("rust macros".to_string(), 5),
            ("database design".to_string(), 3),
        ]
    }

    fn tags() -> Vec<(String, i64)> {
        vec![("rust".to_string(), 40), ("russia".to_string(), 2)]
    }

    #[test]
    fn test_prefix_matches_come_first() {
        let suggestions = build_suggestions("rus", &history(), &tags(), 10);
        assert_eq!(
            suggestions,
            vec!["rust async", "rust macros", "rust", "russia"]
        );
    }

    #[test]
    fn test_history_frequency_orders_within_tier() {
        let suggestions = build_suggestions("rust", &history(), &tags(), 10);
        assert_eq!(suggestions[0], "rust async");
        assert_eq!(suggestions[1], "rust macros");
    }

    #[test]
    fn test_containment_ranks_below_prefix() {
        let suggestions = build_suggestions("base", &history(), &tags(), 10);
        assert_eq!(suggestions, vec!["database design"]);
    }

    #[test]
    fn test_limit_caps_results() {
        let suggestions = build_suggestions("", &history(), &tags(), 2);
        assert_eq!(suggestions.len(), 2);
    }

    #[test]
    fn test_no_match_returns_empty() {
        assert!(build_suggestions("zzz", &history(), &tags(), 10).is_empty());
    }

    #[test]
    fn test_empty_partial_returns_top_candidates() {
        let suggestions = build_suggestions("", &history(), &tags(), 10);
        assert_eq!(suggestions[0], "rust async");
        assert!(suggestions.contains(&"rust".to_string()));
    }
}
