//! Tag rows, closure-table maintenance, and assignments
//!
//! The closure table stores one row per (descendant, ancestor) pair
//! including the self row at depth 0. Re-parenting recomputes the moved
//! subtree arena-style: collect affected ids, delete their closure rows,
//! reinsert from the new ancestor chains — O(subtree) in one transaction.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{EngineError, Result};

/// A persisted tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRow {
    pub id: String,
    /// Normalized, unique name
    pub name: String,
    pub parent_id: Option<String>,
    pub color: String,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub usage_count: i64,
    pub is_system: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

const TAG_COLUMNS: &str =
    "id, name, parent_id, color, icon, sort_order, usage_count, is_system, is_active, created_at, updated_at";

fn row_to_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<TagRow> {
    Ok(TagRow {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        color: row.get(3)?,
        icon: row.get(4)?,
        sort_order: row.get(5)?,
        usage_count: row.get(6)?,
        is_system: row.get::<_, i64>(7)? != 0,
        is_active: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn get_tag(conn: &Connection, id: &str) -> Result<Option<TagRow>> {
    conn.query_row(
        &format!("SELECT {} FROM tags WHERE id = ?1", TAG_COLUMNS),
        params![id],
        |row| row_to_tag(row),
    )
    .optional()
    .map_err(|e| EngineError::db_operation("get tag", e))
}

pub(crate) fn find_tag_by_name(conn: &Connection, name: &str) -> Result<Option<TagRow>> {
    conn.query_row(
        &format!("SELECT {} FROM tags WHERE name = ?1", TAG_COLUMNS),
        params![name],
        |row| row_to_tag(row),
    )
    .optional()
    .map_err(|e| EngineError::db_operation("find tag by name", e))
}

pub(crate) fn insert_tag(conn: &Connection, tag: &TagRow) -> Result<()> {
    conn.execute(
        "INSERT INTO tags (id, name, parent_id, color, icon, sort_order, usage_count, is_system, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            tag.id,
            tag.name,
            tag.parent_id,
            tag.color,
            tag.icon,
            tag.sort_order,
            tag.usage_count,
            tag.is_system as i64,
            tag.is_active as i64,
            tag.created_at,
            tag.updated_at,
        ],
    )
    .map_err(|e| EngineError::db_operation(&format!("insert tag {}", tag.name), e))?;
    Ok(())
}

/// All tags, id → (parent_id, name)
///
/// Inactive rows are included: soft-deleted tags keep their place in
/// ancestor chains, so closure rebuilds must walk through them.
pub(crate) fn load_tag_graph(
    conn: &Connection,
) -> Result<HashMap<String, (Option<String>, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, parent_id, name FROM tags")
        .map_err(|e| EngineError::db_operation("prepare tag graph query", e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, Option<String>>(1)?, row.get::<_, String>(2)?),
            ))
        })
        .map_err(|e| EngineError::db_operation("execute tag graph query", e))?;

    let mut graph = HashMap::new();
    for row in rows {
        let (id, value) = row.map_err(|e| EngineError::db_operation("read tag graph row", e))?;
        graph.insert(id, value);
    }
    Ok(graph)
}

/// Whether `candidate_ancestor` is on the ancestor chain of `tag_id`
/// (or is the tag itself)
pub(crate) fn is_self_or_descendant(
    conn: &Connection,
    tag_id: &str,
    candidate: &str,
) -> Result<bool> {
    if tag_id == candidate {
        return Ok(true);
    }
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tag_closure WHERE tag_id = ?1 AND ancestor_id = ?2",
            params![candidate, tag_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| EngineError::db_operation("check tag descendants", e))?;
    Ok(found.is_some())
}

/// Ids of the subtree rooted at a tag, including the tag itself
pub(crate) fn subtree_ids(conn: &Connection, tag_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT tag_id FROM tag_closure WHERE ancestor_id = ?1 ORDER BY depth")
        .map_err(|e| EngineError::db_operation("prepare subtree query", e))?;

    let rows = stmt
        .query_map(params![tag_id], |row| row.get::<_, String>(0))
        .map_err(|e| EngineError::db_operation("execute subtree query", e))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.map_err(|e| EngineError::db_operation("read subtree id", e))?);
    }
    Ok(ids)
}

/// Insert the full closure row set for a single tag from its parent chain
pub(crate) fn insert_closure_rows(
    conn: &Connection,
    tag_id: &str,
    parent_id: Option<&str>,
) -> Result<()> {
    let chain = ancestor_chain(conn, tag_id, parent_id)?;
    write_closure_rows(conn, tag_id, &chain)
}

/// Root-to-tag id chain (inclusive), derived from the parent's closure rows
fn ancestor_chain(
    conn: &Connection,
    tag_id: &str,
    parent_id: Option<&str>,
) -> Result<Vec<String>> {
    let mut chain = Vec::new();
    if let Some(parent) = parent_id {
        let mut stmt = conn
            .prepare(
                "SELECT ancestor_id FROM tag_closure WHERE tag_id = ?1 ORDER BY depth DESC",
            )
            .map_err(|e| EngineError::db_operation("prepare ancestor chain query", e))?;
        let rows = stmt
            .query_map(params![parent], |row| row.get::<_, String>(0))
            .map_err(|e| EngineError::db_operation("execute ancestor chain query", e))?;
        for row in rows {
            chain.push(row.map_err(|e| EngineError::db_operation("read ancestor id", e))?);
        }
    }
    chain.push(tag_id.to_string());
    Ok(chain)
}

/// Write closure rows for a tag given its root-to-tag chain
fn write_closure_rows(conn: &Connection, tag_id: &str, chain: &[String]) -> Result<()> {
    let path = format!("/{}", chain.join("/"));
    for (hops, ancestor) in chain.iter().rev().enumerate() {
        conn.execute(
            "INSERT INTO tag_closure (tag_id, ancestor_id, depth, path) VALUES (?1, ?2, ?3, ?4)",
            params![tag_id, ancestor, hops as i64, path],
        )
        .map_err(|e| EngineError::db_operation("insert closure row", e))?;
    }
    Ok(())
}

/// Recompute closure rows for the subtree rooted at `root_tag_id`
///
/// Call after the tag's `parent_id` has been updated, inside the same
/// transaction. Cost is proportional to the subtree size.
pub(crate) fn rebuild_closure_subtree(conn: &Connection, root_tag_id: &str) -> Result<()> {
    let subtree = subtree_ids(conn, root_tag_id)?;
    let graph = load_tag_graph(conn)?;

    for id in &subtree {
        conn.execute("DELETE FROM tag_closure WHERE tag_id = ?1", params![id])
            .map_err(|e| EngineError::db_operation("clear closure subtree", e))?;
    }

    for id in &subtree {
        let mut chain = vec![id.clone()];
        let mut cursor = graph.get(id).and_then(|(parent, _)| parent.clone());
        while let Some(parent) = cursor {
            if chain.contains(&parent) {
                // A cycle here means the store was already inconsistent;
                // stop walking rather than loop forever.
                return Err(EngineError::Other(format!(
                    "tag hierarchy contains a cycle at {}",
                    parent
                )));
            }
            chain.push(parent.clone());
            cursor = graph.get(&parent).and_then(|(p, _)| p.clone());
        }
        chain.reverse();
        write_closure_rows(conn, id, &chain)?;
    }

    Ok(())
}

/// Depth of a tag's closure self row; always 0 when the invariant holds
pub(crate) fn closure_self_depth(conn: &Connection, tag_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT depth FROM tag_closure WHERE tag_id = ?1 AND ancestor_id = ?1",
        params![tag_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| EngineError::db_operation("get closure self row", e))
}

pub(crate) fn assignment_exists(conn: &Connection, tag_id: &str, content_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM tag_assignments WHERE tag_id = ?1 AND content_id = ?2",
            params![tag_id, content_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| EngineError::db_operation("check tag assignment", e))?;
    Ok(found.is_some())
}

/// Create an assignment and bump the tag's usage counter
pub(crate) fn insert_assignment(conn: &Connection, tag_id: &str, content_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO tag_assignments (tag_id, content_id) VALUES (?1, ?2)",
        params![tag_id, content_id],
    )
    .map_err(|e| EngineError::db_operation("insert tag assignment", e))?;
    conn.execute(
        "UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?1",
        params![tag_id],
    )
    .map_err(|e| EngineError::db_operation("increment tag usage", e))?;
    Ok(())
}

/// Remove an assignment and decrement the tag's usage counter
pub(crate) fn delete_assignment(conn: &Connection, tag_id: &str, content_id: &str) -> Result<()> {
    let removed = conn
        .execute(
            "DELETE FROM tag_assignments WHERE tag_id = ?1 AND content_id = ?2",
            params![tag_id, content_id],
        )
        .map_err(|e| EngineError::db_operation("delete tag assignment", e))?;
    if removed > 0 {
        conn.execute(
            "UPDATE tags SET usage_count = MAX(0, usage_count - 1) WHERE id = ?1",
            params![tag_id],
        )
        .map_err(|e| EngineError::db_operation("decrement tag usage", e))?;
    }
    Ok(())
}

/// Tags currently assigned to a content unit, id → name
pub(crate) fn assignments_for_content(
    conn: &Connection,
    content_id: &str,
) -> Result<HashMap<String, String>> {
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.name FROM tag_assignments a
             JOIN tags t ON t.id = a.tag_id
             WHERE a.content_id = ?1",
        )
        .map_err(|e| EngineError::db_operation("prepare assignments query", e))?;

    let rows = stmt
        .query_map(params![content_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| EngineError::db_operation("execute assignments query", e))?;

    let mut map = HashMap::new();
    for row in rows {
        let (id, name) = row.map_err(|e| EngineError::db_operation("read assignment", e))?;
        map.insert(id, name);
    }
    Ok(map)
}
