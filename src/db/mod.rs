//! SQLite store for the knowledge graph and search index
//!
//! One connection per engine instance. Writes are serialized through the
//! connection; rusqlite's `Connection` is not `Sync`, so two threads can
//! never interleave writes to the same unit through one engine. WAL mode
//! plus a busy timeout bound cross-process contention; an expired wait
//! surfaces as `StoreTimeout`.

pub(crate) mod docs;
mod history;
pub(crate) mod refs;
mod schema;
pub(crate) mod tag_rows;

use std::path::Path;

use rusqlite::Connection;

use crate::error::{EngineError, Result};

pub use docs::{DocumentMatch, DocumentRow, DocumentSearchParams};
pub use refs::ReferenceRow;
pub use schema::{create_schema, SchemaCreateResult, CURRENT_SCHEMA_VERSION};
pub use tag_rows::TagRow;

/// SQLite store for the engine
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the store at the given path
    ///
    /// Returns the database together with the schema outcome; on
    /// `NeedsRebuild` the host should resync all content into the engine.
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<(Self, SchemaCreateResult)> {
        let conn = Connection::open(path).map_err(|e| {
            EngineError::StoreUnavailable(format!(
                "failed to open store at {}: {}",
                path.display(),
                e
            ))
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| EngineError::StoreUnavailable(format!("failed to enable WAL mode: {}", e)))?;
        conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))
            .map_err(|e| EngineError::StoreUnavailable(format!("failed to set busy timeout: {}", e)))?;

        let schema_result = create_schema(&conn)
            .map_err(|e| EngineError::StoreUnavailable(format!("failed to create schema: {}", e)))?;

        Ok((Database { conn }, schema_result))
    }

    /// Open an in-memory store (tests and ephemeral hosts)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| EngineError::StoreUnavailable(format!("failed to open store: {}", e)))?;
        create_schema(&conn)
            .map_err(|e| EngineError::StoreUnavailable(format!("failed to create schema: {}", e)))?;
        Ok(Database { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn reference_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM refs", [], |r| r.get(0))
            .map_err(|e| EngineError::db_operation("count references", e))
    }

    /// Sum of incoming counts across all targets; equals `reference_count`
    /// whenever the backlink accounting invariant holds
    pub fn incoming_count_total(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COALESCE(SUM(incoming_count), 0) FROM ref_stats",
                [],
                |r| r.get(0),
            )
            .map_err(|e| EngineError::db_operation("sum reference stats", e))
    }

    pub fn tag_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM tags WHERE is_active = 1", [], |r| {
                r.get(0)
            })
            .map_err(|e| EngineError::db_operation("count tags", e))
    }

    /// Active tag names with usage counts, most used first; feeds
    /// suggestion ranking
    pub fn popular_tag_names(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, usage_count FROM tags WHERE is_active = 1
                 ORDER BY usage_count DESC, name LIMIT ?1",
            )
            .map_err(|e| EngineError::db_operation("prepare popular tags", e))?;
        let rows = stmt
            .query_map(rusqlite::params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| EngineError::db_operation("execute popular tags", e))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row.map_err(|e| EngineError::db_operation("read popular tag", e))?);
        }
        Ok(names)
    }

    pub fn document_count(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .map_err(|e| EngineError::db_operation("count documents", e))
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'schema_version'",
                [],
                |r| {
                    let s: String = r.get(0)?;
                    Ok(s.parse().unwrap_or(i64::from(CURRENT_SCHEMA_VERSION)))
                },
            )
            .map_err(|e| EngineError::db_operation("get schema version", e))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Checkpoint WAL so rapidly reopened stores see committed state.
        let _ = self.conn.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }
}

#[cfg(test)]
mod tests;
