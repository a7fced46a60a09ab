//! Reference extraction from raw text
//!
//! Recognizes `[[Target]]` / `[[Target|Display]]` page references and
//! `((block-id))` block references, with `[start, end)` byte offsets into
//! the source text. Matches inside fenced code blocks and inline backtick
//! spans are skipped best-effort. Malformed brackets are ignored, never an
//! error.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Kind of link a reference candidate represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkType {
    PageReference,
    BlockReference,
    Alias,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::PageReference => "page-reference",
            LinkType::BlockReference => "block-reference",
            LinkType::Alias => "alias",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page-reference" => Some(LinkType::PageReference),
            "block-reference" => Some(LinkType::BlockReference),
            "alias" => Some(LinkType::Alias),
            _ => None,
        }
    }

    /// Entity type of the target this link points at
    pub fn target_type(&self) -> &'static str {
        match self {
            LinkType::BlockReference => "block",
            _ => "page",
        }
    }
}

/// A single parsed reference with its source span
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceCandidate {
    /// Target identifier (page title or block id), trimmed
    pub target: String,
    /// Display text from `[[Target|Display]]`, if any
    pub display_text: Option<String>,
    pub link_type: LinkType,
    /// Byte offset of the opening bracket in the source text
    pub start: usize,
    /// Byte offset one past the closing bracket
    pub end: usize,
}

static WIKI_LINK_RE: OnceLock<Regex> = OnceLock::new();
static BLOCK_REF_RE: OnceLock<Regex> = OnceLock::new();
static INLINE_CODE_RE: OnceLock<Regex> = OnceLock::new();

fn wiki_link_re() -> &'static Regex {
    // Target may not contain brackets or pipes; display may not contain brackets.
    WIKI_LINK_RE.get_or_init(|| Regex::new(r"\[\[([^\[\]|]+)(?:\|([^\[\]|]+))?\]\]").unwrap())
}

fn block_ref_re() -> &'static Regex {
    BLOCK_REF_RE.get_or_init(|| Regex::new(r"\(\(([^()\s][^()]*)\)\)").unwrap())
}

fn inline_code_re() -> &'static Regex {
    INLINE_CODE_RE.get_or_init(|| Regex::new(r"`[^`\n]+`").unwrap())
}

/// Parse all reference candidates from a text snapshot
///
/// Guarantees deterministic ordering by offset and no overlapping spans.
pub fn parse_references(text: &str) -> Vec<ReferenceCandidate> {
    let mut candidates = Vec::new();
    let mut in_fence = false;
    let mut line_start = 0;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            line_start += line.len();
            continue;
        }
        if !in_fence {
            scan_line(line, line_start, &mut candidates);
        }
        line_start += line.len();
    }

    candidates.sort_by_key(|c| c.start);
    candidates
}

fn scan_line(line: &str, line_start: usize, out: &mut Vec<ReferenceCandidate>) {
    // Inline code spans on this line; references inside them do not count.
    let code_spans: Vec<(usize, usize)> = inline_code_re()
        .find_iter(line)
        .map(|m| (m.start(), m.end()))
        .collect();
    let in_code =
        |start: usize, end: usize| code_spans.iter().any(|&(cs, ce)| start < ce && end > cs);

    for cap in wiki_link_re().captures_iter(line) {
        let target = cap[1].trim();
        if target.is_empty() {
            continue;
        }
        let display = cap
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        let full = cap.get(0).expect("capture group 0 always present");
        if in_code(full.start(), full.end()) {
            continue;
        }

        let link_type = if display.is_some() {
            LinkType::Alias
        } else {
            LinkType::PageReference
        };

        out.push(ReferenceCandidate {
            target: target.to_string(),
            display_text: display,
            link_type,
            start: line_start + full.start(),
            end: line_start + full.end(),
        });
    }

    for cap in block_ref_re().captures_iter(line) {
        let target = cap[1].trim();
        if target.is_empty() {
            continue;
        }
        let full = cap.get(0).expect("capture group 0 always present");
        if in_code(full.start(), full.end()) {
            continue;
        }
        let start = line_start + full.start();

        // A block ref inside a wiki link span would overlap; the regexes
        // cannot both match the same bytes, but keep the guarantee explicit.
        if out
            .iter()
            .any(|c| start < c.end && line_start + full.end() > c.start)
        {
            continue;
        }

        out.push(ReferenceCandidate {
            target: target.to_string(),
            display_text: None,
            link_type: LinkType::BlockReference,
            start,
            end: line_start + full.end(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_reference() {
        let refs = parse_references("See [[Page A]] for details");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "Page A");
        assert_eq!(refs[0].link_type, LinkType::PageReference);
        assert_eq!(refs[0].display_text, None);
    }

    #[test]
    fn test_parse_alias_reference() {
        let refs = parse_references("See [[Page B|B]]");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "Page B");
        assert_eq!(refs[0].display_text.as_deref(), Some("B"));
        assert_eq!(refs[0].link_type, LinkType::Alias);
    }

    #[test]
    fn test_parse_block_reference() {
        let refs = parse_references("As noted in ((block-123))");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "block-123");
        assert_eq!(refs[0].link_type, LinkType::BlockReference);
        assert_eq!(refs[0].link_type.target_type(), "block");
    }

    #[test]
    fn test_offsets_reconstruct_source() {
        let text = "See [[Page A]] and [[Page B|B]] plus ((blk-9))";
        let refs = parse_references(text);
        assert_eq!(refs.len(), 3);
        assert_eq!(&text[refs[0].start..refs[0].end], "[[Page A]]");
        assert_eq!(&text[refs[1].start..refs[1].end], "[[Page B|B]]");
        assert_eq!(&text[refs[2].start..refs[2].end], "((blk-9))");
    }

    #[test]
    fn test_ordering_and_no_overlap() {
        let text = "[[A]] text ((b1)) more [[C|c]]";
        let refs = parse_references(text);
        assert_eq!(refs.len(), 3);
        for pair in refs.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_unbalanced_brackets_ignored() {
        assert!(parse_references("broken [[Page A").is_empty());
        assert!(parse_references("[[ ]]").is_empty());
        assert!(parse_references("((  ))").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_references("").is_empty());
    }

    #[test]
    fn test_skips_fenced_code() {
        let text = "before [[Real]]\n```\n[[Fake]]\n```\nafter [[AlsoReal]]\n";
        let refs = parse_references(text);
        let targets: Vec<_> = refs.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["Real", "AlsoReal"]);
    }

    #[test]
    fn test_skips_inline_code() {
        let refs = parse_references("use `[[NotALink]]` but [[Real]]");
        let targets: Vec<_> = refs.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["Real"]);
    }

    #[test]
    fn test_multiline_offsets() {
        let text = "line one\nsee [[Target]]\n";
        let refs = parse_references(text);
        assert_eq!(refs.len(), 1);
        assert_eq!(&text[refs[0].start..refs[0].end], "[[Target]]");
    }

    #[test]
    fn test_cjk_targets() {
        let refs = parse_references("链接 [[技术笔记]] 这里");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "技术笔记");
    }
}
