//! Tag management
//!
//! CRUD over tags, closure-table hierarchy maintenance, merge and
//! similarity operations, and reconciliation of tag assignments from
//! content text. Tags are soft-deleted (`is_active = false`) so
//! historical associations survive.

mod similar;

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::db::{self, tag_rows, Database, TagRow};
use crate::error::{EngineError, Result};
use crate::extract::{
    extract_tags, normalize_tag_name, validate_tag_name, TagExtractOptions,
};

pub use similar::{edit_distance, name_similarity};

const DEFAULT_TAG_COLOR: &str = "#3b82f6";

/// Fields for creating a tag
#[derive(Debug, Clone, Default)]
pub struct NewTag {
    pub name: String,
    pub parent_id: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i64,
    pub is_system: bool,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: Option<String>,
    /// `Some(None)` moves the tag to the root
    pub parent_id: Option<Option<String>>,
    pub color: Option<String>,
    pub icon: Option<Option<String>>,
    pub sort_order: Option<i64>,
}

/// Sort order for tag search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagSortBy {
    #[default]
    Name,
    UsageCount,
    CreatedAt,
    SortOrder,
}

/// Options for `search_tags`
#[derive(Debug, Clone)]
pub struct TagSearchOptions {
    /// Substring match on the normalized name
    pub query: Option<String>,
    pub parent_id: Option<String>,
    /// Only tags without a parent
    pub root_only: bool,
    pub sort_by: TagSortBy,
    pub limit: usize,
    pub offset: usize,
}

impl Default for TagSearchOptions {
    fn default() -> Self {
        Self {
            query: None,
            parent_id: None,
            root_only: false,
            sort_by: TagSortBy::Name,
            limit: 50,
            offset: 0,
        }
    }
}

/// A tag with its descendants
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagTree {
    pub tag: TagRow,
    pub children: Vec<TagTree>,
}

/// A similar-name match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarTag {
    pub tag: TagRow,
    pub score: f64,
}

/// Outcome of merging one tag into another
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub moved_assignments: usize,
    pub moved_references: usize,
}

/// Outcome of reconciling a unit's tag assignments from text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TagSyncResult {
    pub added: usize,
    pub removed: usize,
    pub created_tags: usize,
}

/// Service owning tags, their hierarchy, and assignments
pub struct TagService<'a> {
    db: &'a Database,
    config: EngineConfig,
}

impl<'a> TagService<'a> {
    pub fn new(db: &'a Database, config: &EngineConfig) -> Self {
        Self {
            db,
            config: config.clone(),
        }
    }

    pub fn get_tag(&self, id: &str) -> Result<Option<TagRow>> {
        tag_rows::get_tag(self.db.conn(), id)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<TagRow>> {
        tag_rows::find_tag_by_name(self.db.conn(), &normalize_tag_name(name))
    }

    /// Create a tag, normalizing and validating the name first
    ///
    /// A name clash with an active tag is a `DuplicateTagName` conflict; a
    /// clash with a soft-deleted tag reactivates it in place.
    pub fn create_tag(&self, new_tag: &NewTag) -> Result<TagRow> {
        let normalized = self.checked_name(&new_tag.name)?;
        let conn = self.db.conn();

        if let Some(parent) = &new_tag.parent_id {
            self.require_active(parent)?;
        }

        let now = Utc::now().timestamp_millis();

        if let Some(existing) = tag_rows::find_tag_by_name(conn, &normalized)? {
            if existing.is_active {
                return Err(EngineError::DuplicateTagName {
                    name: normalized,
                    existing_id: existing.id,
                });
            }
            return self.reactivate(&existing, new_tag, now);
        }

        let tag = TagRow {
            id: format!("tag-{}", Ulid::new().to_string().to_lowercase()),
            name: normalized,
            parent_id: new_tag.parent_id.clone(),
            color: new_tag
                .color
                .clone()
                .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            icon: new_tag.icon.clone(),
            sort_order: new_tag.sort_order,
            usage_count: 0,
            is_system: new_tag.is_system,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;
        tag_rows::insert_tag(&tx, &tag)?;
        tag_rows::insert_closure_rows(&tx, &tag.id, tag.parent_id.as_deref())?;
        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tracing::debug!(tag_id = %tag.id, name = %tag.name, "created tag");
        Ok(tag)
    }

    fn reactivate(&self, existing: &TagRow, new_tag: &NewTag, now: i64) -> Result<TagRow> {
        let tx = self
            .db
            .conn()
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        tx.execute(
            "UPDATE tags SET is_active = 1, parent_id = ?1, color = ?2, icon = ?3,
                 sort_order = ?4, updated_at = ?5 WHERE id = ?6",
            rusqlite::params![
                new_tag.parent_id,
                new_tag
                    .color
                    .clone()
                    .unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
                new_tag.icon,
                new_tag.sort_order,
                now,
                existing.id,
            ],
        )
        .map_err(|e| EngineError::db_operation("reactivate tag", e))?;
        tag_rows::rebuild_closure_subtree(&tx, &existing.id)?;

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tag_rows::get_tag(self.db.conn(), &existing.id)?
            .ok_or_else(|| EngineError::not_found("tag", &existing.id))
    }

    /// Update tag fields; re-parenting rebuilds the closure subtree
    pub fn update_tag(&self, id: &str, update: &TagUpdate) -> Result<TagRow> {
        let conn = self.db.conn();
        let current = self.require_active(id)?;

        let new_name = match &update.name {
            Some(raw) => {
                let normalized = self.checked_name(raw)?;
                if normalized != current.name {
                    if let Some(other) = tag_rows::find_tag_by_name(conn, &normalized)? {
                        return Err(EngineError::DuplicateTagName {
                            name: normalized,
                            existing_id: other.id,
                        });
                    }
                }
                Some(normalized)
            }
            None => None,
        };

        let reparent = match &update.parent_id {
            Some(new_parent) if *new_parent != current.parent_id => {
                if let Some(parent) = new_parent {
                    self.require_active(parent)?;
                    if tag_rows::is_self_or_descendant(conn, id, parent)? {
                        return Err(EngineError::CyclicHierarchy {
                            tag_id: id.to_string(),
                            parent_id: parent.clone(),
                        });
                    }
                }
                Some(new_parent.clone())
            }
            _ => None,
        };

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        tx.execute(
            "UPDATE tags SET
                 name = COALESCE(?1, name),
                 color = COALESCE(?2, color),
                 sort_order = COALESCE(?3, sort_order),
                 updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                new_name,
                update.color,
                update.sort_order,
                Utc::now().timestamp_millis(),
                id,
            ],
        )
        .map_err(|e| EngineError::db_operation("update tag", e))?;

        if let Some(icon) = &update.icon {
            tx.execute(
                "UPDATE tags SET icon = ?1 WHERE id = ?2",
                rusqlite::params![icon, id],
            )
            .map_err(|e| EngineError::db_operation("update tag icon", e))?;
        }

        if let Some(new_parent) = &reparent {
            tx.execute(
                "UPDATE tags SET parent_id = ?1 WHERE id = ?2",
                rusqlite::params![new_parent, id],
            )
            .map_err(|e| EngineError::db_operation("update tag parent", e))?;
            tag_rows::rebuild_closure_subtree(&tx, id)?;
        }

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tag_rows::get_tag(conn, id)?.ok_or_else(|| EngineError::not_found("tag", id))
    }

    /// Soft-delete a tag, preserving assignments and hierarchy rows
    pub fn delete_tag(&self, id: &str) -> Result<()> {
        let tag = tag_rows::get_tag(self.db.conn(), id)?
            .ok_or_else(|| EngineError::not_found("tag", id))?;
        if !tag.is_active {
            return Ok(());
        }
        self.db
            .conn()
            .execute(
                "UPDATE tags SET is_active = 0, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![Utc::now().timestamp_millis(), id],
            )
            .map_err(|e| EngineError::db_operation("soft-delete tag", e))?;
        tracing::debug!(tag_id = %id, "soft-deleted tag");
        Ok(())
    }

    /// Merge `source_id` into `target_id`
    ///
    /// Moves all assignments and tag-targeted references to the target,
    /// re-parents the source's children under the target, then
    /// soft-deletes the source. Retrying a completed merge is a no-op.
    #[tracing::instrument(skip(self))]
    pub fn merge_tags(&self, source_id: &str, target_id: &str) -> Result<MergeResult> {
        if source_id == target_id {
            return Err(EngineError::invalid_value(
                "merge",
                "source and target are the same tag",
            ));
        }

        let conn = self.db.conn();
        let target = tag_rows::get_tag(conn, target_id)?
            .ok_or_else(|| EngineError::not_found("tag", target_id))?;
        if !target.is_active {
            return Err(EngineError::InvalidMergeTarget {
                tag_id: target_id.to_string(),
                reason: "target tag is deleted".to_string(),
            });
        }

        let source = tag_rows::get_tag(conn, source_id)?
            .ok_or_else(|| EngineError::not_found("tag", source_id))?;
        if !source.is_active {
            // Already merged (or deleted): idempotent success.
            return Ok(MergeResult::default());
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        let moved_assignments = tx
            .execute(
                "INSERT OR IGNORE INTO tag_assignments (tag_id, content_id)
                 SELECT ?1, content_id FROM tag_assignments WHERE tag_id = ?2",
                rusqlite::params![target_id, source_id],
            )
            .map_err(|e| EngineError::db_operation("move tag assignments", e))?;
        tx.execute(
            "DELETE FROM tag_assignments WHERE tag_id = ?1",
            rusqlite::params![source_id],
        )
        .map_err(|e| EngineError::db_operation("clear source assignments", e))?;

        let moved_references = db::refs::retarget_tag_references(&tx, source_id, target_id)?;

        // A target inside the source's subtree is lifted to the source's
        // parent first; otherwise moving the source's children under it
        // would leave the target parented to a deactivated tag.
        if tag_rows::is_self_or_descendant(&tx, source_id, target_id)? {
            tx.execute(
                "UPDATE tags SET parent_id = ?1 WHERE id = ?2",
                rusqlite::params![source.parent_id, target_id],
            )
            .map_err(|e| EngineError::db_operation("lift merge target", e))?;
            tag_rows::rebuild_closure_subtree(&tx, target_id)?;
        }

        // Children of the source move under the target.
        let mut reparented: Vec<String> = Vec::new();
        {
            let mut stmt = tx
                .prepare("SELECT id FROM tags WHERE parent_id = ?1 AND id <> ?2")
                .map_err(|e| EngineError::db_operation("prepare child tags query", e))?;
            let rows = stmt
                .query_map(rusqlite::params![source_id, target_id], |row| {
                    row.get::<_, String>(0)
                })
                .map_err(|e| EngineError::db_operation("execute child tags query", e))?;
            for row in rows {
                reparented.push(row.map_err(|e| EngineError::db_operation("read child tag", e))?);
            }
        }
        for child in &reparented {
            tx.execute(
                "UPDATE tags SET parent_id = ?1 WHERE id = ?2",
                rusqlite::params![target_id, child],
            )
            .map_err(|e| EngineError::db_operation("re-parent child tag", e))?;
            tag_rows::rebuild_closure_subtree(&tx, child)?;
        }

        let now = Utc::now().timestamp_millis();
        tx.execute(
            "UPDATE tags SET usage_count =
                 (SELECT COUNT(*) FROM tag_assignments WHERE tag_id = id),
                 updated_at = ?1
             WHERE id IN (?2, ?3)",
            rusqlite::params![now, source_id, target_id],
        )
        .map_err(|e| EngineError::db_operation("recount tag usage", e))?;
        tx.execute(
            "UPDATE tags SET is_active = 0 WHERE id = ?1",
            rusqlite::params![source_id],
        )
        .map_err(|e| EngineError::db_operation("deactivate merged tag", e))?;

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tracing::debug!(
            source_id,
            target_id,
            moved_assignments,
            moved_references,
            "merged tags"
        );
        Ok(MergeResult {
            moved_assignments,
            moved_references,
        })
    }

    /// Reconcile a unit's tag assignments against extracted candidates
    ///
    /// Each call is a full snapshot: candidates missing from the text are
    /// unassigned, unknown names are materialized as new tags. Names that
    /// match a soft-deleted tag are skipped so explicit deletion is not
    /// undone by a resync.
    pub fn sync_tags(&self, content_id: &str, text: &str) -> Result<TagSyncResult> {
        let options = TagExtractOptions {
            min_confidence: self.config.min_tag_confidence,
            bare_keywords: true,
            bare_keyword_confidence: self.config.bare_keyword_confidence,
        };
        let candidates = extract_tags(text, &options);
        let parsed: HashSet<String> = candidates.into_iter().map(|c| c.name).collect();

        let tx = self
            .db
            .conn()
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        let current = tag_rows::assignments_for_content(&tx, content_id)?;
        let current_names: HashSet<String> = current.values().cloned().collect();
        let mut result = TagSyncResult::default();
        let now = Utc::now().timestamp_millis();

        for name in &parsed {
            if current_names.contains(name) {
                continue;
            }
            let tag_id = match tag_rows::find_tag_by_name(&tx, name)? {
                Some(tag) if tag.is_active => tag.id,
                Some(_) => continue,
                None => {
                    let tag = TagRow {
                        id: format!("tag-{}", Ulid::new().to_string().to_lowercase()),
                        name: name.clone(),
                        parent_id: None,
                        color: DEFAULT_TAG_COLOR.to_string(),
                        icon: None,
                        sort_order: 0,
                        usage_count: 0,
                        is_system: false,
                        is_active: true,
                        created_at: now,
                        updated_at: now,
                    };
                    tag_rows::insert_tag(&tx, &tag)?;
                    tag_rows::insert_closure_rows(&tx, &tag.id, None)?;
                    result.created_tags += 1;
                    tag.id
                }
            };
            tag_rows::insert_assignment(&tx, &tag_id, content_id)?;
            result.added += 1;
        }

        for (tag_id, name) in &current {
            if !parsed.contains(name) {
                tag_rows::delete_assignment(&tx, tag_id, content_id)?;
                result.removed += 1;
            }
        }

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;
        Ok(result)
    }

    /// Explicitly assign a tag; returns false when already assigned
    pub fn assign_tag(&self, tag_id: &str, content_id: &str) -> Result<bool> {
        self.require_active(tag_id)?;
        let conn = self.db.conn();
        if tag_rows::assignment_exists(conn, tag_id, content_id)? {
            return Ok(false);
        }
        tag_rows::insert_assignment(conn, tag_id, content_id)?;
        Ok(true)
    }

    /// Explicitly remove an assignment; returns false when absent
    pub fn unassign_tag(&self, tag_id: &str, content_id: &str) -> Result<bool> {
        let conn = self.db.conn();
        if !tag_rows::assignment_exists(conn, tag_id, content_id)? {
            return Ok(false);
        }
        tag_rows::delete_assignment(conn, tag_id, content_id)?;
        Ok(true)
    }

    /// Search active tags by name substring, parent, and sort options
    pub fn search_tags(&self, options: &TagSearchOptions) -> Result<Vec<TagRow>> {
        let mut sql = String::from(
            "SELECT id, name, parent_id, color, icon, sort_order, usage_count, is_system, is_active, created_at, updated_at
             FROM tags WHERE is_active = 1",
        );
        let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(query) = &options.query {
            bind.push(Box::new(format!("%{}%", normalize_tag_name(query))));
            sql.push_str(&format!(" AND name LIKE ?{}", bind.len()));
        }
        if options.root_only {
            sql.push_str(" AND parent_id IS NULL");
        } else if let Some(parent) = &options.parent_id {
            bind.push(Box::new(parent.clone()));
            sql.push_str(&format!(" AND parent_id = ?{}", bind.len()));
        }

        sql.push_str(match options.sort_by {
            TagSortBy::Name => " ORDER BY name",
            TagSortBy::UsageCount => " ORDER BY usage_count DESC, name",
            TagSortBy::CreatedAt => " ORDER BY created_at DESC",
            TagSortBy::SortOrder => " ORDER BY sort_order, name",
        });

        // A negative LIMIT means unlimited in SQLite.
        bind.push(Box::new(i64::try_from(options.limit).unwrap_or(-1)));
        sql.push_str(&format!(" LIMIT ?{}", bind.len()));
        bind.push(Box::new(i64::try_from(options.offset).unwrap_or(0)));
        sql.push_str(&format!(" OFFSET ?{}", bind.len()));

        let conn = self.db.conn();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EngineError::db_operation("prepare tag search", e))?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                |row| {
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
                },
            )
            .map_err(|e| EngineError::db_operation("execute tag search", e))?;

        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.map_err(|e| EngineError::db_operation("read tag search row", e))?);
        }
        Ok(tags)
    }

    /// Build the tag tree rooted at `root_id`, or all root trees
    pub fn tag_hierarchy(&self, root_id: Option<&str>) -> Result<Vec<TagTree>> {
        let all = self.search_tags(&TagSearchOptions {
            limit: usize::MAX,
            ..Default::default()
        })?;

        let mut children_of: HashMap<Option<String>, Vec<TagRow>> = HashMap::new();
        for tag in all {
            children_of.entry(tag.parent_id.clone()).or_default().push(tag);
        }
        for bucket in children_of.values_mut() {
            bucket.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        }

        fn build(tag: TagRow, children_of: &HashMap<Option<String>, Vec<TagRow>>) -> TagTree {
            let children = children_of
                .get(&Some(tag.id.clone()))
                .map(|kids| {
                    kids.iter()
                        .cloned()
                        .map(|kid| build(kid, children_of))
                        .collect()
                })
                .unwrap_or_default();
            TagTree { tag, children }
        }

        match root_id {
            Some(id) => {
                let root = self.require_active(id)?;
                Ok(vec![build(root, &children_of)])
            }
            None => Ok(children_of
                .get(&None)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|root| build(root, &children_of))
                .collect()),
        }
    }

    /// Active tags whose names resemble the given one
    pub fn similar_tags(&self, name: &str, limit: usize) -> Result<Vec<SimilarTag>> {
        let needle = normalize_tag_name(name);
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let all = self.search_tags(&TagSearchOptions {
            limit: usize::MAX,
            ..Default::default()
        })?;

        let mut results: Vec<SimilarTag> = all
            .into_iter()
            .filter_map(|tag| {
                let score = name_similarity(&needle, &tag.name);
                (score >= self.config.similarity_threshold).then_some(SimilarTag { tag, score })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    edit_distance(&needle, &a.tag.name).cmp(&edit_distance(&needle, &b.tag.name))
                })
                .then_with(|| a.tag.name.cmp(&b.tag.name))
        });
        results.truncate(limit);
        Ok(results)
    }

    /// Most-used active tags
    pub fn popular_tags(&self, limit: usize) -> Result<Vec<TagRow>> {
        self.search_tags(&TagSearchOptions {
            sort_by: TagSortBy::UsageCount,
            limit,
            ..Default::default()
        })
    }

    /// Closure self-row depth, exposed for consistency checks
    pub fn closure_self_depth(&self, tag_id: &str) -> Result<Option<i64>> {
        tag_rows::closure_self_depth(self.db.conn(), tag_id)
    }

    fn checked_name(&self, raw: &str) -> Result<String> {
        let check = validate_tag_name(raw);
        if !check.is_valid {
            return Err(EngineError::InvalidTagName {
                name: raw.to_string(),
                reason: check.errors.join("; "),
            });
        }
        Ok(normalize_tag_name(raw))
    }

    fn require_active(&self, id: &str) -> Result<TagRow> {
        match tag_rows::get_tag(self.db.conn(), id)? {
            Some(tag) if tag.is_active => Ok(tag),
            _ => Err(EngineError::not_found("tag", id)),
        }
    }
}
