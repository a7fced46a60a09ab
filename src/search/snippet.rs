//! Snippets and highlight spans
//!
//! Matching is done on a case-folded copy of the content, with a byte map
//! back into the original text so highlight offsets always index the
//! string the host actually holds. Spans are merged when they overlap.

use serde::Serialize;

/// Byte range into the original content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighlightSpan {
    pub start: usize,
    pub end: usize,
}

/// Locate every case-insensitive occurrence of the needles
///
/// Returned spans are sorted by start and non-overlapping.
pub fn find_match_spans(content: &str, needles: &[String]) -> Vec<HighlightSpan> {
    if content.is_empty() || needles.is_empty() {
        return Vec::new();
    }

    let (folded, map) = fold_with_map(content);
    let mut spans = Vec::new();

    for needle in needles {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(pos) = folded[from..].find(&needle) {
            let fold_start = from + pos;
            let fold_end = fold_start + needle.len();
            let start = map[fold_start];
            let end = if fold_end >= map.len() {
                content.len()
            } else {
                map[fold_end]
            };
            spans.push(HighlightSpan { start, end });
            from = fold_end;
        }
    }

    merge_spans(spans)
}

/// Cut a window of at most `max_chars` characters around the first span
///
/// Without spans the window starts at the beginning. Truncated edges get
/// an ellipsis; newlines are flattened to spaces so the snippet stays a
/// single line.
pub fn build_snippet(content: &str, spans: &[HighlightSpan], max_chars: usize) -> String {
    if content.is_empty() || max_chars == 0 {
        return String::new();
    }

    let starts: Vec<usize> = content.char_indices().map(|(i, _)| i).collect();
    let anchor_byte = spans.first().map(|s| s.start).unwrap_or(0);
    let anchor_idx = starts.partition_point(|&b| b <= anchor_byte).saturating_sub(1);

    // Lead a quarter of the window so the match is not flush left.
    let window_start = anchor_idx.saturating_sub(max_chars / 4);
    let window_end = (window_start + max_chars).min(starts.len());

    let start_byte = starts[window_start];
    let end_byte = if window_end == starts.len() {
        content.len()
    } else {
        starts[window_end]
    };

    let mut snippet = String::new();
    if start_byte > 0 {
        snippet.push('…');
    }
    snippet.push_str(&content[start_byte..end_byte].replace('\n', " "));
    if end_byte < content.len() {
        snippet.push('…');
    }
    snippet
}

/// Lowercased copy plus a map from each folded byte to the byte offset of
/// the originating character
fn fold_with_map(text: &str) -> (String, Vec<usize>) {
    let mut folded = String::with_capacity(text.len());
    let mut map = Vec::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        for lc in c.to_lowercase() {
            let before = folded.len();
            folded.push(lc);
            for _ in before..folded.len() {
                map.push(i);
            }
        }
    }
    (folded, map)
}

fn merge_spans(mut spans: Vec<HighlightSpan>) -> Vec<HighlightSpan> {
    spans.sort_by_key(|s| (s.start, s.end));
    let mut merged: Vec<HighlightSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needles(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_case_insensitive_spans() {
        let spans = find_match_spans("Rust and RUST and rust", &needles(&["rust"]));
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0], HighlightSpan { start: 0, end: 4 });
        assert_eq!(spans[2], HighlightSpan { start: 18, end: 22 });
    }

    #[test]
    fn test_overlapping_spans_merge() {
        let spans = find_match_spans("javascript", &needles(&["java", "javascript", "script"]));
        assert_eq!(spans, vec![HighlightSpan { start: 0, end: 10 }]);
    }

    #[test]
    fn test_cjk_spans_are_byte_offsets() {
        let content = "学习前端开发";
        let spans = find_match_spans(content, &needles(&["前端"]));
        assert_eq!(spans.len(), 1);
        assert_eq!(&content[spans[0].start..spans[0].end], "前端");
    }

    #[test]
    fn test_no_match_no_spans() {
        assert!(find_match_spans("hello world", &needles(&["absent"])).is_empty());
    }

    #[test]
    fn test_snippet_contains_match() {
        let content = format!("{} needle {}", "x".repeat(300), "y".repeat(300));
        let spans = find_match_spans(&content, &needles(&["needle"]));
        let snippet = build_snippet(&content, &spans, 80);
        assert!(snippet.contains("needle"));
        assert!(snippet.starts_with('…'));
        assert!(snippet.ends_with('…'));
        assert!(snippet.chars().count() <= 82);
    }

    #[test]
    fn test_snippet_short_content_untruncated() {
        let snippet = build_snippet("short text", &[], 160);
        assert_eq!(snippet, "short text");
    }

    #[test]
    fn test_snippet_flattens_newlines() {
        let snippet = build_snippet("line one\nline two", &[], 160);
        assert!(!snippet.contains('\n'));
    }

    #[test]
    fn test_snippet_respects_char_boundaries() {
        let content = "中文".repeat(200);
        let spans = find_match_spans(&content, &needles(&["中文"]));
        // Must not panic on a multi-byte boundary.
        let snippet = build_snippet(&content, &spans, 50);
        assert!(!snippet.is_empty());
    }
}
