//! Search history persistence
//!
//! Append-only usage telemetry. Nothing here is authoritative: rows feed
//! suggestion ranking and can be pruned at any time without affecting
//! search correctness.

use chrono::Utc;
use rusqlite::params;

use crate::error::{EngineError, Result};

impl super::Database {
    pub fn record_search(
        &self,
        query: &str,
        filters_json: &str,
        result_count: usize,
        took_ms: u64,
    ) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO search_history (query, filters, result_count, took_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    query,
                    filters_json,
                    result_count as i64,
                    took_ms as i64,
                    Utc::now().timestamp_millis(),
                ],
            )
            .map_err(|e| EngineError::db_operation("record search history", e))?;
        Ok(())
    }

    /// Most frequent history queries as `(query, frequency)`, most
    /// frequent first, recency breaking ties
    pub fn top_queries(&self, limit: usize) -> Result<Vec<(String, i64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT query, COUNT(*) AS freq FROM search_history
                 WHERE query <> ''
                 GROUP BY query
                 ORDER BY freq DESC, MAX(created_at) DESC
                 LIMIT ?1",
            )
            .map_err(|e| EngineError::db_operation("prepare top queries", e))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| EngineError::db_operation("execute top queries", e))?;

        let mut queries = Vec::new();
        for row in rows {
            queries.push(row.map_err(|e| EngineError::db_operation("read top query", e))?);
        }
        Ok(queries)
    }

    pub fn history_count(&self) -> Result<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM search_history", [], |r| r.get(0))
            .map_err(|e| EngineError::db_operation("count search history", e))
    }

    /// Delete history entries older than the cutoff; returns rows removed
    pub fn prune_history(&self, older_than_ms: i64) -> Result<usize> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM search_history WHERE created_at < ?1",
                params![older_than_ms],
            )
            .map_err(|e| EngineError::db_operation("prune search history", e))?;
        if removed > 0 {
            tracing::debug!(removed, "pruned search history");
        }
        Ok(removed)
    }
}
