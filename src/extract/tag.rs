//! Tag extraction from raw text
//!
//! Tags arrive through several surface syntaxes with different levels of
//! trust: explicit labeled lists score highest, hashtags next, mentions
//! and bare keywords lower. Candidates are normalized and deduplicated
//! before the tag service reconciles them with the store.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Maximum length of a normalized tag name
pub const MAX_TAG_NAME_LEN: usize = 50;

/// Surface syntax a tag candidate was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagSyntax {
    Hashtag,
    Mention,
    LabeledList,
    Category,
    BareKeyword,
}

impl TagSyntax {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSyntax::Hashtag => "hashtag",
            TagSyntax::Mention => "mention",
            TagSyntax::LabeledList => "labeled-list",
            TagSyntax::Category => "category",
            TagSyntax::BareKeyword => "bare-keyword",
        }
    }
}

/// A candidate tag with extraction confidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagCandidate {
    /// Normalized tag name
    pub name: String,
    /// Confidence in [0, 1]; explicit syntaxes score higher
    pub confidence: f64,
    /// Byte offset of the candidate in the source text
    pub start: usize,
    pub source: TagSyntax,
}

/// Options controlling tag extraction
#[derive(Debug, Clone)]
pub struct TagExtractOptions {
    /// Candidates below this confidence are dropped
    pub min_confidence: f64,
    /// Whether to run the bare-keyword heuristic at all
    pub bare_keywords: bool,
    /// Confidence assigned to bare-keyword candidates
    pub bare_keyword_confidence: f64,
}

impl Default for TagExtractOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            bare_keywords: true,
            bare_keyword_confidence: 0.5,
        }
    }
}

const HASHTAG_CONFIDENCE: f64 = 0.9;
const MENTION_CONFIDENCE: f64 = 0.7;
const LABELED_CONFIDENCE: f64 = 0.95;

static HASHTAG_RE: OnceLock<Regex> = OnceLock::new();
static MENTION_RE: OnceLock<Regex> = OnceLock::new();
static LABELED_RE: OnceLock<Regex> = OnceLock::new();
static CAPITALIZED_RE: OnceLock<Regex> = OnceLock::new();

/// Known technical terms matched by the bare-keyword heuristic
const KNOWN_TERMS: &[&str] = &[
    "rust",
    "javascript",
    "typescript",
    "python",
    "react",
    "vue",
    "docker",
    "kubernetes",
    "database",
    "frontend",
    "backend",
    "api",
    "graphql",
    "sqlite",
];

fn hashtag_re() -> &'static Regex {
    HASHTAG_RE.get_or_init(|| Regex::new(r"(^|\s)#([\p{L}\p{N}_-]+)").unwrap())
}

fn mention_re() -> &'static Regex {
    MENTION_RE.get_or_init(|| Regex::new(r"(^|\s)@([\p{L}\p{N}_-]+)").unwrap())
}

fn labeled_re() -> &'static Regex {
    // `标签: a, b` / `Tags: a, b` / `分类: x` / `Category: x`
    LABELED_RE.get_or_init(|| {
        Regex::new(r"(?im)^\s*(标签|tags?|分类|category)[:：]\s*(.+)$").unwrap()
    })
}

fn capitalized_re() -> &'static Regex {
    CAPITALIZED_RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]{3,}\b").unwrap())
}

/// Extract tag candidates from a text snapshot
///
/// Duplicates (after normalization) are merged keeping the highest
/// confidence; candidates below `min_confidence` are dropped. Results are
/// ordered by first occurrence.
pub fn extract_tags(text: &str, options: &TagExtractOptions) -> Vec<TagCandidate> {
    let mut best: HashMap<String, TagCandidate> = HashMap::new();

    let mut add = |name: &str, confidence: f64, start: usize, source: TagSyntax| {
        let normalized = normalize_tag_name(name);
        if normalized.is_empty() {
            return;
        }
        match best.get(&normalized) {
            Some(existing) if existing.confidence >= confidence => {}
            _ => {
                best.insert(
                    normalized.clone(),
                    TagCandidate {
                        name: normalized,
                        confidence,
                        start,
                        source,
                    },
                );
            }
        }
    };

    for cap in hashtag_re().captures_iter(text) {
        let m = cap.get(2).expect("hashtag capture");
        add(m.as_str(), HASHTAG_CONFIDENCE, m.start(), TagSyntax::Hashtag);
    }

    for cap in mention_re().captures_iter(text) {
        let m = cap.get(2).expect("mention capture");
        add(m.as_str(), MENTION_CONFIDENCE, m.start(), TagSyntax::Mention);
    }

    for cap in labeled_re().captures_iter(text) {
        let label = cap.get(1).expect("label capture").as_str().to_lowercase();
        let values = cap.get(2).expect("values capture");
        let source = if label == "分类" || label == "category" {
            TagSyntax::Category
        } else {
            TagSyntax::LabeledList
        };

        // Separators include multi-byte CJK punctuation, so segment
        // offsets come from the separator byte positions.
        let values_str = values.as_str();
        let mut seg_start = 0;
        let seps = values_str
            .match_indices([',', '，', '、'])
            .map(|(idx, sep)| (idx, sep.len()))
            .chain(std::iter::once((values_str.len(), 0)));
        for (sep_idx, sep_len) in seps {
            let part = &values_str[seg_start..sep_idx];
            if !part.trim().is_empty() {
                let lead = part.len() - part.trim_start().len();
                add(part, LABELED_CONFIDENCE, values.start() + seg_start + lead, source);
            }
            seg_start = sep_idx + sep_len;
        }
    }

    if options.bare_keywords {
        scan_bare_keywords(text, options.bare_keyword_confidence, &mut add);
    }

    let mut candidates: Vec<TagCandidate> = best
        .into_values()
        .filter(|c| c.confidence >= options.min_confidence)
        .collect();
    candidates.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));
    candidates
}

fn scan_bare_keywords(
    text: &str,
    confidence: f64,
    add: &mut impl FnMut(&str, f64, usize, TagSyntax),
) {
    let lower = text.to_lowercase();
    for term in KNOWN_TERMS {
        for (idx, m) in lower.match_indices(term) {
            // Standalone word check on the lowercased shadow; offsets are
            // only used for ordering, so the shadow offset is good enough.
            let before_ok = idx == 0
                || !lower[..idx]
                    .chars()
                    .next_back()
                    .is_some_and(char::is_alphanumeric);
            let after = idx + m.len();
            let after_ok = after >= lower.len()
                || !lower[after..].chars().next().is_some_and(char::is_alphanumeric);
            if before_ok && after_ok {
                add(term, confidence, idx, TagSyntax::BareKeyword);
            }
        }
    }

    for m in capitalized_re().find_iter(text) {
        add(m.as_str(), confidence, m.start(), TagSyntax::BareKeyword);
    }
}

/// Normalize a tag name to its storage form
///
/// Trims, strips a leading `#`/`@`, lowercases, collapses whitespace into
/// underscores, strips special characters, and truncates to
/// `MAX_TAG_NAME_LEN` characters.
pub fn normalize_tag_name(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches(['#', '@']).trim();
    let mut out = String::with_capacity(trimmed.len());
    let mut last_was_sep = false;

    for c in trimmed.to_lowercase().chars() {
        if c.is_whitespace() {
            if !out.is_empty() && !last_was_sep {
                out.push('_');
                last_was_sep = true;
            }
        } else if c.is_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            last_was_sep = false;
        }
        // Other special characters are stripped.
    }

    while out.ends_with('_') {
        out.pop();
    }

    out.chars().take(MAX_TAG_NAME_LEN).collect()
}

/// Result of validating a tag name against storage invariants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagNameCheck {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Validate a raw tag name before storage is attempted
///
/// Shared with the tag service so parser output always satisfies the
/// storage invariants when `is_valid` is true.
pub fn validate_tag_name(name: &str) -> TagNameCheck {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    let normalized = normalize_tag_name(name);

    if normalized.is_empty() {
        errors.push("tag name is empty after normalization".to_string());
    }

    if name.trim().chars().count() > MAX_TAG_NAME_LEN {
        errors.push(format!(
            "tag name exceeds {} characters",
            MAX_TAG_NAME_LEN
        ));
        if !normalized.is_empty() {
            suggestions.push(normalized.clone());
        }
    }

    if !errors.is_empty() {
        return TagNameCheck {
            is_valid: false,
            errors,
            warnings,
            suggestions,
        };
    }

    if normalized != name.trim() {
        warnings.push("tag name was normalized".to_string());
        suggestions.push(normalized);
    }

    TagNameCheck {
        is_valid: true,
        errors,
        warnings,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_hashtags() {
        let tags = extract_tags("Working on #rust and #knowledge-graphs today", &Default::default());
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rust", "knowledge-graphs"]);
        assert!(tags.iter().all(|t| t.source == TagSyntax::Hashtag));
    }

    #[test]
    fn test_extract_labeled_list_chinese() {
        let tags = extract_tags("标签: 前端, 后端\n正文内容", &Default::default());
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["前端", "后端"]);
        assert!(tags.iter().all(|t| t.source == TagSyntax::LabeledList));
    }

    #[test]
    fn test_labeled_list_offsets_are_byte_accurate() {
        let text = "标签: 前端，后端";
        let tags = extract_tags(text, &Default::default());
        assert_eq!(tags.len(), 2);
        for tag in &tags {
            assert_eq!(&text[tag.start..tag.start + tag.name.len()], tag.name);
        }

        let text = "Tags: alpha, beta";
        let tags = extract_tags(text, &Default::default());
        assert_eq!(tags[1].name, "beta");
        assert_eq!(tags[1].start, text.find("beta").unwrap());
    }

    #[test]
    fn test_extract_labeled_list_english() {
        let tags = extract_tags("Tags: alpha, beta, gamma", &Default::default());
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_extract_category() {
        let tags = extract_tags("分类: 技术", &Default::default());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "技术");
        assert_eq!(tags[0].source, TagSyntax::Category);
    }

    #[test]
    fn test_duplicates_keep_highest_confidence() {
        let tags = extract_tags("Tags: rust\nalso #rust in body", &Default::default());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "rust");
        assert_eq!(tags[0].confidence, 0.95);
    }

    #[test]
    fn test_min_confidence_drops_bare_keywords() {
        // Bare keywords default to 0.5, below the 0.6 cutoff.
        let tags = extract_tags("plain docker mention", &Default::default());
        assert!(tags.is_empty());

        let options = TagExtractOptions {
            min_confidence: 0.4,
            ..Default::default()
        };
        let tags = extract_tags("plain docker mention", &options);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "docker");
        assert_eq!(tags[0].source, TagSyntax::BareKeyword);
    }

    #[test]
    fn test_mentions_pass_default_cutoff() {
        let tags = extract_tags("ping @alice about this", &Default::default());
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "alice");
        assert_eq!(tags[0].source, TagSyntax::Mention);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_tags("", &Default::default()).is_empty());
    }

    #[test]
    fn test_normalize_tag_name() {
        assert_eq!(normalize_tag_name("  Machine Learning  "), "machine_learning");
        assert_eq!(normalize_tag_name("#Rust"), "rust");
        assert_eq!(normalize_tag_name("c++"), "c");
        assert_eq!(normalize_tag_name("技术"), "技术");
        assert_eq!(normalize_tag_name("   "), "");
    }

    #[test]
    fn test_normalize_truncates() {
        let long = "a".repeat(80);
        assert_eq!(normalize_tag_name(&long).chars().count(), MAX_TAG_NAME_LEN);
    }

    #[test]
    fn test_validate_empty_name() {
        let check = validate_tag_name("   ");
        assert!(!check.is_valid);
        assert!(!check.errors.is_empty());
    }

    #[test]
    fn test_validate_too_long() {
        let check = validate_tag_name(&"x".repeat(60));
        assert!(!check.is_valid);
        assert_eq!(check.suggestions.len(), 1);
    }

    #[test]
    fn test_validate_normalizable_name_warns() {
        let check = validate_tag_name("Machine Learning");
        assert!(check.is_valid);
        assert_eq!(check.warnings.len(), 1);
        assert_eq!(check.suggestions, vec!["machine_learning".to_string()]);
    }

    #[test]
    fn test_validate_clean_name() {
        let check = validate_tag_name("rust");
        assert!(check.is_valid);
        assert!(check.errors.is_empty());
        assert!(check.warnings.is_empty());
    }
}
