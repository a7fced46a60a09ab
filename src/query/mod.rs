//! Search query language
//!
//! Grammar: free terms, `"exact phrase"`, `+must`, `-exclude`, and field
//! filters `tag:name`, `type:note|block|tag|link`, `author:name`,
//! `date:YYYY-MM-DD` or `date:start..end`. Parsing never hard-fails:
//! problems surface as diagnostics alongside a best-effort query so the
//! search still runs.

pub mod suggest;

use chrono::NaiveDate;
use serde::Serialize;

pub use suggest::build_suggestions;

/// Severity of a parse diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal issue found while parsing or validating a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Document type accepted by the `type:` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocTypeFilter {
    Note,
    Block,
    Tag,
    Link,
}

impl DocTypeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocTypeFilter::Note => "note",
            DocTypeFilter::Block => "block",
            DocTypeFilter::Tag => "tag",
            DocTypeFilter::Link => "link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "note" => Some(DocTypeFilter::Note),
            "block" => Some(DocTypeFilter::Block),
            "tag" => Some(DocTypeFilter::Tag),
            "link" => Some(DocTypeFilter::Link),
            _ => None,
        }
    }
}

/// Date constraint from the `date:` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateFilter {
    On(NaiveDate),
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateFilter {
    /// Inclusive `[start, end]` day range in unix milliseconds
    pub fn to_millis_range(&self) -> (i64, i64) {
        let (start, end) = match self {
            DateFilter::On(d) => (*d, *d),
            DateFilter::Range { start, end } => (*start, *end),
        };
        let start_ms = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0);
        let end_ms = end
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp_millis() + 999)
            .unwrap_or(i64::MAX);
        (start_ms, end_ms)
    }
}

/// Field filters recognized by the query language
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryFilters {
    pub tag: Option<String>,
    pub doc_type: Option<DocTypeFilter>,
    pub author: Option<String>,
    pub date: Option<DateFilter>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.doc_type.is_none()
            && self.author.is_none()
            && self.date.is_none()
    }
}

/// Structured form of a search query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub raw: String,
    /// Free terms; a result should match at least one
    pub terms: Vec<String>,
    /// Exact phrases from quoted segments
    pub phrases: Vec<String>,
    /// `+term` — every result must include these
    pub must: Vec<String>,
    /// `-term` — no result may include these
    pub exclude: Vec<String>,
    pub filters: QueryFilters,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParsedQuery {
    /// Whether the query has no positive match criteria at all
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.phrases.is_empty()
            && self.must.is_empty()
            && self.filters.is_empty()
    }

    /// Terms used for highlighting: free, must, and phrase text
    pub fn match_terms(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for t in self.terms.iter().chain(self.must.iter()) {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        for p in &self.phrases {
            if !out.contains(p) {
                out.push(p.clone());
            }
        }
        out
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }
}

/// Parse a raw query string into its structured form
///
/// Never returns an error: unknown filter keys fall back to free terms
/// with a warning, malformed dates drop the filter with an error
/// diagnostic, and an unbalanced quote consumes the rest of the input as
/// a phrase.
pub fn parse(raw: &str) -> ParsedQuery {
    let mut query = ParsedQuery {
        raw: raw.to_string(),
        ..Default::default()
    };

    for token in lex(raw, &mut query.diagnostics) {
        match token {
            Token::Phrase(p) => {
                if !p.trim().is_empty() {
                    query.phrases.push(p.trim().to_string());
                }
            }
            Token::Word(w) => classify_word(&w, &mut query),
        }
    }

    query
}

/// Validate a raw query, reporting problems without executing it
pub fn validate(raw: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if raw.trim().is_empty() {
        diagnostics.push(Diagnostic::error("query is empty"));
        return diagnostics;
    }
    let parsed = parse(raw);
    diagnostics.extend(parsed.diagnostics);
    diagnostics
}

enum Token {
    Word(String),
    Phrase(String),
}

fn lex(raw: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
                let mut phrase = String::new();
                let mut closed = false;
                for pc in chars.by_ref() {
                    if pc == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(pc);
                }
                if !closed {
                    diagnostics.push(Diagnostic::warning("unbalanced quote in query"));
                }
                tokens.push(Token::Phrase(phrase));
            }
            c if c.is_whitespace() => {
                if !word.is_empty() {
                    tokens.push(Token::Word(std::mem::take(&mut word)));
                }
            }
            _ => word.push(c),
        }
    }
    if !word.is_empty() {
        tokens.push(Token::Word(word));
    }

    tokens
}

fn classify_word(word: &str, query: &mut ParsedQuery) {
    if let Some(rest) = word.strip_prefix('+') {
        if !rest.is_empty() {
            query.must.push(rest.to_string());
        }
        return;
    }
    if let Some(rest) = word.strip_prefix('-') {
        if !rest.is_empty() {
            query.exclude.push(rest.to_string());
        }
        return;
    }

    if let Some((key, value)) = word.split_once(':') {
        if !value.is_empty() {
            match key.to_lowercase().as_str() {
                "tag" => {
                    query.filters.tag = Some(value.to_string());
                    return;
                }
                "type" => {
                    match DocTypeFilter::parse(value) {
                        Some(t) => query.filters.doc_type = Some(t),
                        None => {
                            query.diagnostics.push(Diagnostic::warning(format!(
                                "unknown type filter value: {} (expected note, block, tag, or link)",
                                value
                            )));
                            query.terms.push(value.to_string());
                        }
                    }
                    return;
                }
                "author" => {
                    query.filters.author = Some(value.to_string());
                    return;
                }
                "date" => {
                    match parse_date_filter(value) {
                        Some(d) => query.filters.date = Some(d),
                        None => query.diagnostics.push(Diagnostic::error(format!(
                            "malformed date filter: {} (expected YYYY-MM-DD or start..end)",
                            value
                        ))),
                    }
                    return;
                }
                _ => {
                    // Unknown filter keys are preserved as free terms.
                    query.diagnostics.push(Diagnostic::warning(format!(
                        "unknown filter key: {}",
                        key
                    )));
                }
            }
        }
    }

    query.terms.push(word.to_string());
}

fn parse_date_filter(value: &str) -> Option<DateFilter> {
    if let Some((start, end)) = value.split_once("..") {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?;
        if end < start {
            return None;
        }
        Some(DateFilter::Range { start, end })
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(DateFilter::On)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_free_terms() {
        let q = parse("knowledge graph");
        assert_eq!(q.terms, vec!["knowledge", "graph"]);
        assert!(q.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_must_exclude_and_filter() {
        let q = parse("+JavaScript -deprecated tag:frontend");
        assert_eq!(q.must, vec!["JavaScript"]);
        assert_eq!(q.exclude, vec!["deprecated"]);
        assert_eq!(q.filters.tag.as_deref(), Some("frontend"));
        assert!(q.diagnostics.is_empty());
    }

    #[test]
    fn test_parse_phrase() {
        let q = parse(r#""exact phrase" other"#);
        assert_eq!(q.phrases, vec!["exact phrase"]);
        assert_eq!(q.terms, vec!["other"]);
    }

    #[test]
    fn test_unbalanced_quote_is_warning() {
        let q = parse(r#"start "never closed"#);
        assert_eq!(q.phrases, vec!["never closed"]);
        assert_eq!(q.diagnostics.len(), 1);
        assert_eq!(q.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_unknown_filter_key_preserved_as_term() {
        let q = parse("scope:everything");
        assert_eq!(q.terms, vec!["scope:everything"]);
        assert_eq!(q.diagnostics.len(), 1);
        assert_eq!(q.diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_type_filter() {
        let q = parse("type:block something");
        assert_eq!(q.filters.doc_type, Some(DocTypeFilter::Block));
        assert_eq!(q.terms, vec!["something"]);
    }

    #[test]
    fn test_invalid_type_value_warns() {
        let q = parse("type:banana");
        assert!(q.filters.doc_type.is_none());
        assert_eq!(q.terms, vec!["banana"]);
        assert_eq!(q.diagnostics.len(), 1);
    }

    #[test]
    fn test_date_filter_single() {
        let q = parse("date:2024-03-01");
        assert_eq!(
            q.filters.date,
            Some(DateFilter::On(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
            ))
        );
    }

    #[test]
    fn test_date_filter_range() {
        let q = parse("date:2024-01-01..2024-02-01");
        match q.filters.date {
            Some(DateFilter::Range { start, end }) => {
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
                assert_eq!(end, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
            }
            other => panic!("expected range filter, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_date_is_error_diagnostic() {
        let q = parse("date:not-a-date");
        assert!(q.filters.date.is_none());
        assert!(q.has_errors());
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let q = parse("date:2024-02-01..2024-01-01");
        assert!(q.filters.date.is_none());
        assert!(q.has_errors());
    }

    #[test]
    fn test_validate_empty_query() {
        let diags = validate("   ");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_parse_empty_string() {
        let q = parse("");
        assert!(q.is_empty());
        assert!(q.diagnostics.is_empty());
    }

    #[test]
    fn test_cjk_terms_pass_through() {
        let q = parse("前端 框架");
        assert_eq!(q.terms, vec!["前端", "框架"]);
    }

    #[test]
    fn test_match_terms_dedup() {
        let q = parse(r#"graph +graph "graph theory""#);
        assert_eq!(q.match_terms(), vec!["graph", "graph theory"]);
    }
}
