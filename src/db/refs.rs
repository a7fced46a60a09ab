//! Reference rows and backlink counters
//!
//! Every insert or delete of a reference adjusts exactly one matching
//! `ref_stats` row in the same transaction, upserting to zero-or-create
//! as needed. Counter decrements clamp at zero.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::{EngineError, Result};
use crate::extract::LinkType;

/// A persisted reference between two content units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRow {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub target_type: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub display_text: Option<String>,
    /// Byte offset of the reference in the source text
    pub position: i64,
    pub created_at: i64,
}

fn row_to_reference(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReferenceRow> {
    let link_type_str: String = row.get(5)?;
    Ok(ReferenceRow {
        id: row.get(0)?,
        source_type: row.get(1)?,
        source_id: row.get(2)?,
        target_type: row.get(3)?,
        target_id: row.get(4)?,
        link_type: LinkType::parse(&link_type_str).unwrap_or(LinkType::PageReference),
        display_text: row.get(6)?,
        position: row.get(7)?,
        created_at: row.get(8)?,
    })
}

const REFERENCE_COLUMNS: &str =
    "id, source_type, source_id, target_type, target_id, link_type, display_text, position, created_at";

/// Load the current reference set for a source unit
pub(crate) fn load_references(
    conn: &Connection,
    source_type: &str,
    source_id: &str,
) -> Result<Vec<ReferenceRow>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM refs WHERE source_type = ?1 AND source_id = ?2 ORDER BY position",
            REFERENCE_COLUMNS
        ))
        .map_err(|e| EngineError::db_operation("prepare reference query", e))?;

    let rows = stmt
        .query_map(params![source_type, source_id], |row| row_to_reference(row))
        .map_err(|e| EngineError::db_operation("execute reference query", e))?;

    let mut references = Vec::new();
    for row in rows {
        references.push(row.map_err(|e| EngineError::db_operation("read reference", e))?);
    }
    Ok(references)
}

/// Insert a reference and bump the target's incoming counter
pub(crate) fn insert_reference(conn: &Connection, reference: &ReferenceRow) -> Result<()> {
    conn.execute(
        "INSERT INTO refs (id, source_type, source_id, target_type, target_id, link_type, display_text, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            reference.id,
            reference.source_type,
            reference.source_id,
            reference.target_type,
            reference.target_id,
            reference.link_type.as_str(),
            reference.display_text,
            reference.position,
            reference.created_at,
        ],
    )
    .map_err(|e| {
        EngineError::db_operation(
            &format!(
                "insert reference {} -> {}",
                reference.source_id, reference.target_id
            ),
            e,
        )
    })?;

    bump_stat(conn, &reference.target_type, &reference.target_id, 1)?;
    Ok(())
}

/// Update the mutable fields of an existing reference
pub(crate) fn update_reference(
    conn: &Connection,
    id: &str,
    link_type: LinkType,
    display_text: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE refs SET link_type = ?1, display_text = ?2 WHERE id = ?3",
        params![link_type.as_str(), display_text, id],
    )
    .map_err(|e| EngineError::db_operation("update reference", e))?;
    Ok(())
}

/// Delete a reference and decrement the target's incoming counter
pub(crate) fn delete_reference(conn: &Connection, reference: &ReferenceRow) -> Result<()> {
    conn.execute("DELETE FROM refs WHERE id = ?1", params![reference.id])
        .map_err(|e| EngineError::db_operation("delete reference", e))?;
    bump_stat(conn, &reference.target_type, &reference.target_id, -1)?;
    Ok(())
}

/// Re-point tag-targeted references from one tag to another, dropping any
/// that would collide with an existing row on the destination
pub(crate) fn retarget_tag_references(
    conn: &Connection,
    source_tag_id: &str,
    target_tag_id: &str,
) -> Result<usize> {
    let moved = conn
        .execute(
            "UPDATE OR IGNORE refs SET target_id = ?2 WHERE target_type = 'tag' AND target_id = ?1",
            params![source_tag_id, target_tag_id],
        )
        .map_err(|e| EngineError::db_operation("retarget tag references", e))?;

    // Rows that collided with the unique constraint stay behind; drop them.
    let dropped = conn
        .execute(
            "DELETE FROM refs WHERE target_type = 'tag' AND target_id = ?1",
            params![source_tag_id],
        )
        .map_err(|e| EngineError::db_operation("drop merged tag references", e))?;

    if moved > 0 || dropped > 0 {
        bump_stat(conn, "tag", target_tag_id, moved as i64)?;
        conn.execute(
            "DELETE FROM ref_stats WHERE target_type = 'tag' AND target_id = ?1",
            params![source_tag_id],
        )
        .map_err(|e| EngineError::db_operation("drop merged tag stats", e))?;
    }

    Ok(moved)
}

/// Adjust a target's incoming counter, creating the row on first use
pub(crate) fn bump_stat(
    conn: &Connection,
    target_type: &str,
    target_id: &str,
    delta: i64,
) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let last_referenced = if delta > 0 { Some(now) } else { None };

    conn.execute(
        "INSERT INTO ref_stats (target_type, target_id, incoming_count, last_referenced_at)
         VALUES (?1, ?2, MAX(0, ?3), ?4)
         ON CONFLICT (target_type, target_id) DO UPDATE SET
             incoming_count = MAX(0, incoming_count + ?3),
             last_referenced_at = COALESCE(?4, last_referenced_at)",
        params![target_type, target_id, delta, last_referenced],
    )
    .map_err(|e| EngineError::db_operation("update reference stats", e))?;
    Ok(())
}

impl super::Database {
    /// All references pointing at a target, newest first
    pub fn backlinks(&self, target_type: &str, target_id: &str) -> Result<Vec<ReferenceRow>> {
        let mut stmt = self
            .conn()
            .prepare(&format!(
                "SELECT {} FROM refs WHERE target_type = ?1 AND target_id = ?2
                 ORDER BY created_at DESC, id DESC",
                REFERENCE_COLUMNS
            ))
            .map_err(|e| EngineError::db_operation("prepare backlinks query", e))?;

        let rows = stmt
            .query_map(params![target_type, target_id], |row| row_to_reference(row))
            .map_err(|e| EngineError::db_operation("execute backlinks query", e))?;

        let mut backlinks = Vec::new();
        for row in rows {
            backlinks.push(row.map_err(|e| EngineError::db_operation("read backlink", e))?);
        }
        Ok(backlinks)
    }

    /// Indexed units of the given type with zero incoming references
    pub fn orphans(&self, doc_type: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT d.id FROM documents d
                 LEFT JOIN ref_stats s ON s.target_type = d.doc_type AND s.target_id = d.id
                 WHERE d.doc_type = ?1 AND COALESCE(s.incoming_count, 0) = 0
                 ORDER BY d.updated_at DESC",
            )
            .map_err(|e| EngineError::db_operation("prepare orphans query", e))?;

        let rows = stmt
            .query_map(params![doc_type], |row| row.get::<_, String>(0))
            .map_err(|e| EngineError::db_operation("execute orphans query", e))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| EngineError::db_operation("read orphan id", e))?);
        }
        Ok(ids)
    }

    /// Most-referenced targets as `(target_type, target_id, incoming_count)`
    pub fn popular_targets(&self, limit: usize) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT target_type, target_id, incoming_count FROM ref_stats
                 WHERE incoming_count > 0
                 ORDER BY incoming_count DESC, last_referenced_at DESC
                 LIMIT ?1",
            )
            .map_err(|e| EngineError::db_operation("prepare popular targets query", e))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .map_err(|e| EngineError::db_operation("execute popular targets query", e))?;

        let mut targets = Vec::new();
        for row in rows {
            targets.push(row.map_err(|e| EngineError::db_operation("read popular target", e))?);
        }
        Ok(targets)
    }

    /// Referenced `(target_type, target_id)` pairs with no indexed document
    pub fn dangling_targets(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT DISTINCT r.target_type, r.target_id FROM refs r
                 LEFT JOIN documents d ON d.doc_type = r.target_type AND d.id = r.target_id
                 WHERE d.id IS NULL
                 ORDER BY r.target_type, r.target_id",
            )
            .map_err(|e| EngineError::db_operation("prepare dangling targets query", e))?;

        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| EngineError::db_operation("execute dangling targets query", e))?;

        let mut targets = Vec::new();
        for row in rows {
            targets.push(row.map_err(|e| EngineError::db_operation("read dangling target", e))?);
        }
        Ok(targets)
    }
}
