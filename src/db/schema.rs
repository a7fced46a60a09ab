//! SQLite schema for the engine store
//!
//! Every table here is derived state: the host owns the content, and the
//! whole store can be rebuilt from content snapshots. On a schema version
//! mismatch the tables are dropped and recreated, and the caller is told
//! a rebuild is needed.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Result of schema creation - indicates whether the store needs a rebuild
#[derive(Debug, PartialEq, Eq)]
pub enum SchemaCreateResult {
    /// Schema present at the current version
    Ok,
    /// Schema was recreated from scratch; host should resync content
    NeedsRebuild,
}

const SCHEMA_SQL: &str = r#"
-- Bidirectional references between content units
CREATE TABLE IF NOT EXISTS refs (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    link_type TEXT NOT NULL,
    display_text TEXT,
    position INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (source_type, source_id, target_type, target_id, position)
);
CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(source_type, source_id);
CREATE INDEX IF NOT EXISTS idx_refs_target ON refs(target_type, target_id);

-- Incoming-reference counters, maintained alongside refs mutations
CREATE TABLE IF NOT EXISTS ref_stats (
    target_type TEXT NOT NULL,
    target_id TEXT NOT NULL,
    incoming_count INTEGER NOT NULL DEFAULT 0,
    last_referenced_at INTEGER,
    PRIMARY KEY (target_type, target_id)
);

-- Tags with soft delete; name is unique in normalized form
CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    parent_id TEXT,
    color TEXT NOT NULL DEFAULT '#3b82f6',
    icon TEXT,
    sort_order INTEGER NOT NULL DEFAULT 0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    is_system INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tags_parent ON tags(parent_id);

-- Closure table: one row per (descendant, ancestor) pair incl. self
CREATE TABLE IF NOT EXISTS tag_closure (
    tag_id TEXT NOT NULL,
    ancestor_id TEXT NOT NULL,
    depth INTEGER NOT NULL,
    path TEXT NOT NULL,
    PRIMARY KEY (tag_id, ancestor_id)
);
CREATE INDEX IF NOT EXISTS idx_tag_closure_ancestor ON tag_closure(ancestor_id);

-- Many-to-many tag assignments
CREATE TABLE IF NOT EXISTS tag_assignments (
    tag_id TEXT NOT NULL,
    content_id TEXT NOT NULL,
    PRIMARY KEY (tag_id, content_id)
);
CREATE INDEX IF NOT EXISTS idx_tag_assignments_content ON tag_assignments(content_id);

-- Derived search documents; never the system of record
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    doc_type TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    author TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type);
CREATE INDEX IF NOT EXISTS idx_documents_updated ON documents(updated_at DESC);

-- Full-text search index with FTS5
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    id UNINDEXED,
    title,
    content,
    tags,
    tokenize='porter unicode61'
);

-- Append-only search usage telemetry; prunable without correctness impact
CREATE TABLE IF NOT EXISTS search_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    filters TEXT NOT NULL DEFAULT '{}',
    result_count INTEGER NOT NULL,
    took_ms INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_search_history_query ON search_history(query);

-- Index metadata
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT
);
"#;

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute("DROP TABLE IF EXISTS refs", [])?;
    conn.execute("DROP TABLE IF EXISTS ref_stats", [])?;
    conn.execute("DROP TABLE IF EXISTS tags", [])?;
    conn.execute("DROP TABLE IF EXISTS tag_closure", [])?;
    conn.execute("DROP TABLE IF EXISTS tag_assignments", [])?;
    conn.execute("DROP TABLE IF EXISTS documents", [])?;
    conn.execute("DROP TABLE IF EXISTS documents_fts", [])?;
    conn.execute("DROP TABLE IF EXISTS search_history", [])?;
    conn.execute("DROP TABLE IF EXISTS index_meta", [])?;
    Ok(())
}

pub fn create_schema(conn: &Connection) -> Result<SchemaCreateResult> {
    let current_version: Option<i32> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'schema_version'",
            [],
            |r| r.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .ok();

    let result = match current_version {
        None => {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                [&CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            SchemaCreateResult::Ok
        }
        Some(v) if v == CURRENT_SCHEMA_VERSION => SchemaCreateResult::Ok,
        Some(v) => {
            drop_all_tables(conn)?;
            conn.execute_batch(SCHEMA_SQL)?;
            conn.execute(
                "INSERT INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                [&CURRENT_SCHEMA_VERSION.to_string()],
            )?;
            tracing::info!(
                "Store schema updated from version {} to {}",
                v,
                CURRENT_SCHEMA_VERSION
            );
            SchemaCreateResult::NeedsRebuild
        }
    };

    Ok(result)
}
