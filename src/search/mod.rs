//! Full-text search over indexed content
//!
//! `SearchService` turns a parsed query into an FTS5 MATCH expression,
//! applies field filters at the SQL level, and decorates matches with
//! snippets and highlight offsets into the original text. Search history
//! is recorded best-effort and only feeds suggestions.

mod snippet;

use std::time::Instant;

use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::db::{self, Database, DocumentRow, DocumentSearchParams};
use crate::error::Result;
use crate::extract::normalize_tag_name;
use crate::query::{build_suggestions, Diagnostic, ParsedQuery};
use crate::text::{is_cjk, segment_for_index, tokenize_with_stemming};

pub use snippet::{build_snippet, find_match_spans, HighlightSpan};

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Relevance,
    UpdatedAt,
}

/// Options for a search call
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
    pub sort_by: SortBy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
            sort_by: SortBy::Relevance,
        }
    }
}

/// One search hit with presentation data
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub document: DocumentRow,
    pub score: f64,
    pub snippet: String,
    /// Byte ranges into `document.content`
    pub highlights: Vec<HighlightSpan>,
}

/// A full search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedResult>,
    /// Matches before limit/offset
    pub total: usize,
    pub took_ms: u64,
    pub diagnostics: Vec<Diagnostic>,
}

/// Service owning the search index and query execution
pub struct SearchService<'a> {
    db: &'a Database,
    config: EngineConfig,
}

impl<'a> SearchService<'a> {
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self {
            db,
            config: config.clone(),
        }
    }

    /// Execute a parsed query
    ///
    /// An empty query (no terms, phrases, musts, or filters) returns an
    /// empty response rather than matching everything. Exclusions alone
    /// cannot select anything and are treated the same way.
    #[tracing::instrument(skip_all, fields(raw = %query.raw))]
    pub fn search(
        &self,
        query: &ParsedQuery,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        cancel.check()?;

        if query.is_empty() {
            return Ok(SearchResponse {
                results: Vec::new(),
                total: 0,
                took_ms: elapsed_ms(started),
                diagnostics: query.diagnostics.clone(),
            });
        }

        let params = DocumentSearchParams {
            fts_query: build_fts_query(query),
            doc_type: query.filters.doc_type.map(|t| t.as_str().to_string()),
            tag: query.filters.tag.as_deref().map(normalize_tag_name),
            author: query.filters.author.clone(),
            updated_between: query.filters.date.map(|d| d.to_millis_range()),
            limit: options.limit,
            offset: options.offset,
            order_by_updated: options.sort_by == SortBy::UpdatedAt,
        };

        let (matches, total) = self.db.search_documents(&params)?;
        cancel.check()?;

        let needles = self.highlight_needles(query);
        let results: Vec<RankedResult> = matches
            .into_iter()
            .map(|m| {
                let highlights = find_match_spans(&m.document.content, &needles);
                let snippet =
                    build_snippet(&m.document.content, &highlights, self.config.snippet_length);
                RankedResult {
                    score: m.score,
                    snippet,
                    highlights,
                    document: m.document,
                }
            })
            .collect();

        let took_ms = elapsed_ms(started);
        self.record_history(query, results.len(), took_ms);

        tracing::debug!(total, returned = results.len(), took_ms, "search executed");
        Ok(SearchResponse {
            results,
            total,
            took_ms,
            diagnostics: query.diagnostics.clone(),
        })
    }

    /// Query completions for a partial input
    ///
    /// Ranked from search history frequency and popular tag names; exact
    /// prefix matches sort before containment matches.
    pub fn suggestions(&self, partial: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        cancel.check()?;
        if partial.trim().is_empty() {
            return Ok(Vec::new());
        }
        let history = self.db.top_queries(50)?;
        let tags = self.db.popular_tag_names(50)?;
        cancel.check()?;
        Ok(build_suggestions(
            partial,
            &history,
            &tags,
            self.config.max_suggestions,
        ))
    }

    /// Add or refresh a document in the index
    pub fn index_document(&self, doc: &DocumentRow) -> Result<()> {
        db::docs::upsert_document(self.db.conn(), doc)
    }

    /// Drop a document from the index; false when it was not indexed
    pub fn remove_document(&self, id: &str) -> Result<bool> {
        db::docs::remove_document(self.db.conn(), id)
    }

    /// Replace the whole index with a fresh snapshot
    pub fn rebuild_index(&self, docs: &[DocumentRow]) -> Result<()> {
        self.db.rebuild_documents(docs)
    }

    // Highlighting is substring-based on the original text. With stemming
    // enabled, each term's stem is added as a needle: Porter stems are
    // almost always prefixes of their inflected forms, so "graph" also
    // marks the start of "graphs" and "graphing".
    fn highlight_needles(&self, query: &ParsedQuery) -> Vec<String> {
        let mut needles = query.match_terms();
        if self.config.stemming {
            for term in query.terms.iter().chain(query.must.iter()) {
                for stem in tokenize_with_stemming(term, true) {
                    // Single-character CJK tokens would highlight far too
                    // much; exact CJK terms are already in the needle set.
                    if stem.chars().any(is_cjk) {
                        continue;
                    }
                    if !needles.contains(&stem) {
                        needles.push(stem);
                    }
                }
            }
        }
        needles
    }

    // History is telemetry, never load-bearing: a failed insert degrades
    // suggestions but must not fail the search that produced it.
    fn record_history(&self, query: &ParsedQuery, result_count: usize, took_ms: u64) {
        let filters_json = match serde_json::to_string(&query.filters) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("failed to serialize search filters: {}", e);
                return;
            }
        };
        if let Err(e) = self
            .db
            .record_search(&query.raw, &filters_json, result_count, took_ms)
        {
            tracing::warn!("failed to record search history: {}", e);
        }
    }
}

/// Assemble the FTS5 MATCH expression for a parsed query
///
/// Free terms form an OR group, musts are ANDed, phrases are quoted, and
/// exclusions append NOT clauses. Every token is quoted with inner quotes
/// doubled, so user input cannot inject FTS syntax. CJK text goes through
/// the same per-character segmentation the index uses.
fn build_fts_query(query: &ParsedQuery) -> Option<String> {
    let mut positive: Vec<String> = Vec::new();

    if !query.terms.is_empty() {
        let group: Vec<String> = query.terms.iter().map(|t| fts_token(t)).collect();
        if group.len() == 1 {
            positive.push(group.into_iter().next().unwrap_or_default());
        } else {
            positive.push(format!("({})", group.join(" OR ")));
        }
    }
    for must in &query.must {
        positive.push(fts_token(must));
    }
    for phrase in &query.phrases {
        positive.push(fts_token(phrase));
    }

    if positive.is_empty() {
        return None;
    }

    let mut expr = positive.join(" AND ");
    for excluded in &query.exclude {
        expr.push_str(" NOT ");
        expr.push_str(&fts_token(excluded));
    }
    Some(expr)
}

fn fts_token(text: &str) -> String {
    format!("\"{}\"", segment_for_index(text).replace('"', "\"\""))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
