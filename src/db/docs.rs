//! Search documents and the FTS5 index
//!
//! The `documents` table holds the original text the host handed us;
//! `documents_fts` holds a shadow copy with CJK runs spaced out so the
//! unicode61 tokenizer can match per character. Both are written in the
//! same transaction, so the index never drifts from the stored document.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::text::segment_for_index;

/// A derived search document; rebuildable, never the system of record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentRow {
    pub id: String,
    pub doc_type: String,
    pub title: String,
    pub content: String,
    /// Denormalized tag names
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A document matched by a search, with its raw relevance score
#[derive(Debug, Clone)]
pub struct DocumentMatch {
    pub document: DocumentRow,
    /// Higher is better (negated bm25 rank)
    pub score: f64,
}

/// Store-level search parameters assembled by the search service
#[derive(Debug, Clone, Default)]
pub struct DocumentSearchParams {
    /// FTS5 MATCH expression; `None` means filter-only search
    pub fts_query: Option<String>,
    pub doc_type: Option<String>,
    pub tag: Option<String>,
    pub author: Option<String>,
    /// Inclusive `[start, end]` bounds on `updated_at`, unix millis
    pub updated_between: Option<(i64, i64)>,
    pub limit: usize,
    pub offset: usize,
    /// Break ties (or fully order filter-only results) by this column
    pub order_by_updated: bool,
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    let tags_json: String = row.get(4)?;
    Ok(DocumentRow {
        id: row.get(0)?,
        doc_type: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        author: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, doc_type, title, content, tags, author, created_at, updated_at";

/// Upsert a document and its index row as one atomic write
pub(crate) fn upsert_document(conn: &Connection, doc: &DocumentRow) -> Result<()> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| EngineError::transaction("start", e))?;
    write_document(&tx, doc)?;
    tx.commit()
        .map_err(|e| EngineError::transaction("commit", e))?;
    Ok(())
}

fn write_document(conn: &Connection, doc: &DocumentRow) -> Result<()> {
    let tags_json = serde_json::to_string(&doc.tags)?;

    conn.execute(
        "INSERT INTO documents (id, doc_type, title, content, tags, author, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT (id) DO UPDATE SET
             doc_type = ?2, title = ?3, content = ?4, tags = ?5,
             author = ?6, created_at = ?7, updated_at = ?8",
        params![
            doc.id,
            doc.doc_type,
            doc.title,
            doc.content,
            tags_json,
            doc.author,
            doc.created_at,
            doc.updated_at,
        ],
    )
    .map_err(|e| EngineError::db_operation(&format!("upsert document {}", doc.id), e))?;

    conn.execute("DELETE FROM documents_fts WHERE id = ?1", params![doc.id])
        .map_err(|e| EngineError::db_operation("clear document index row", e))?;
    conn.execute(
        "INSERT INTO documents_fts (id, title, content, tags) VALUES (?1, ?2, ?3, ?4)",
        params![
            doc.id,
            segment_for_index(&doc.title),
            segment_for_index(&doc.content),
            doc.tags.join(" "),
        ],
    )
    .map_err(|e| EngineError::db_operation(&format!("index document {}", doc.id), e))?;

    Ok(())
}

pub(crate) fn remove_document(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute("DELETE FROM documents_fts WHERE id = ?1", params![id])
        .map_err(|e| EngineError::db_operation("remove document index row", e))?;
    let removed = conn
        .execute("DELETE FROM documents WHERE id = ?1", params![id])
        .map_err(|e| EngineError::db_operation("remove document", e))?;
    Ok(removed > 0)
}

impl super::Database {
    pub fn get_document(&self, id: &str) -> Result<Option<DocumentRow>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                |row| row_to_document(row),
            )
            .optional()
            .map_err(|e| EngineError::db_operation("get document", e))
    }

    /// Clear and repopulate the document store and FTS index
    pub fn rebuild_documents(&self, docs: &[DocumentRow]) -> Result<()> {
        let tx = self
            .conn()
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        tx.execute("DELETE FROM documents_fts", [])
            .map_err(|e| EngineError::db_operation("clear document index", e))?;
        tx.execute("DELETE FROM documents", [])
            .map_err(|e| EngineError::db_operation("clear documents", e))?;

        for doc in docs {
            write_document(&tx, doc)?;
        }

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tracing::info!(count = docs.len(), "rebuilt search documents");
        Ok(())
    }

    /// Execute a search against documents, returning matches and the
    /// total count before limit/offset
    pub fn search_documents(
        &self,
        params_in: &DocumentSearchParams,
    ) -> Result<(Vec<DocumentMatch>, usize)> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        let from = if params_in.fts_query.is_some() {
            where_clauses.push(format!("documents_fts MATCH ?{}", bind.len() + 1));
            bind.push(Box::new(
                params_in.fts_query.clone().unwrap_or_default(),
            ));
            "documents_fts f JOIN documents d ON d.id = f.id"
        } else {
            "documents d"
        };

        if let Some(doc_type) = &params_in.doc_type {
            where_clauses.push(format!("d.doc_type = ?{}", bind.len() + 1));
            bind.push(Box::new(doc_type.clone()));
        }
        if let Some(tag) = &params_in.tag {
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM tag_assignments ta JOIN tags t ON t.id = ta.tag_id
                 WHERE ta.content_id = d.id AND t.name = ?{})",
                bind.len() + 1
            ));
            bind.push(Box::new(tag.clone()));
        }
        if let Some(author) = &params_in.author {
            where_clauses.push(format!("d.author = ?{}", bind.len() + 1));
            bind.push(Box::new(author.clone()));
        }
        if let Some((start, end)) = params_in.updated_between {
            where_clauses.push(format!(
                "d.updated_at BETWEEN ?{} AND ?{}",
                bind.len() + 1,
                bind.len() + 2
            ));
            bind.push(Box::new(start));
            bind.push(Box::new(end));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        // bm25 weights follow title > tags > content; the id column is
        // unindexed and gets weight 0.
        let (score_expr, order_sql) = if params_in.fts_query.is_some() {
            let score = "-bm25(documents_fts, 0.0, 2.0, 1.0, 1.5)";
            let order = if params_in.order_by_updated {
                "ORDER BY d.updated_at DESC"
            } else {
                "ORDER BY score DESC, d.updated_at DESC"
            };
            (score, order)
        } else {
            ("0.0", "ORDER BY d.updated_at DESC")
        };

        let total: usize = {
            let sql = format!("SELECT COUNT(*) FROM {}{}", from, where_sql);
            let count: i64 = self
                .conn()
                .query_row(
                    &sql,
                    rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                    |r| r.get(0),
                )
                .map_err(|e| EngineError::db_operation("count search results", e))?;
            count as usize
        };

        let sql = format!(
            "SELECT d.id, d.doc_type, d.title, d.content, d.tags, d.author, d.created_at, d.updated_at,
                    {} AS score
             FROM {}{} {} LIMIT ?{} OFFSET ?{}",
            score_expr,
            from,
            where_sql,
            order_sql,
            bind.len() + 1,
            bind.len() + 2
        );
        bind.push(Box::new(params_in.limit as i64));
        bind.push(Box::new(params_in.offset as i64));

        let mut stmt = self
            .conn()
            .prepare(&sql)
            .map_err(|e| EngineError::db_operation("prepare search query", e))?;

        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                |row| {
                    let document = row_to_document(row)?;
                    let score: f64 = row.get(8)?;
                    Ok(DocumentMatch { document, score })
                },
            )
            .map_err(|e| EngineError::db_operation("execute search query", e))?;

        let mut matches = Vec::new();
        for row in rows {
            matches.push(row.map_err(|e| EngineError::db_operation("read search result", e))?);
        }

        Ok((matches, total))
    }
}
