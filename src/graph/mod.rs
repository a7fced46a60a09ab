//! Link graph maintenance
//!
//! `LinkGraphService` reconciles a content unit's persisted references
//! with a fresh text snapshot on every change. The diff is keyed by
//! `(target_type, target_id, position)`: new keys are created, matching
//! keys with changed display text or link type are updated, vanished keys
//! are deleted. Counter updates ride in the same transaction, so either
//! the whole diff lands or none of it does.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use ulid::Ulid;

use crate::db::{self, Database, ReferenceRow};
use crate::error::{EngineError, Result};
use crate::extract::{parse_references, ReferenceCandidate};

/// Outcome of one sync pass over a content unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncResult {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Service owning reference-graph consistency
pub struct LinkGraphService<'a> {
    db: &'a Database,
}

impl<'a> LinkGraphService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Reconcile a unit's references against a text snapshot
    ///
    /// Idempotent: syncing identical text twice changes nothing. The
    /// caller debounces keystroke-level edits; every call here is treated
    /// as a meaningful snapshot, not a diff.
    #[tracing::instrument(skip(self, text))]
    pub fn sync(&self, source_type: &str, source_id: &str, text: &str) -> Result<SyncResult> {
        let candidates = parse_references(text);

        let tx = self
            .db
            .conn()
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        let current = db::refs::load_references(&tx, source_type, source_id)?;
        let mut current_by_key: HashMap<(String, String, i64), &ReferenceRow> = current
            .iter()
            .map(|r| {
                (
                    (r.target_type.clone(), r.target_id.clone(), r.position),
                    r,
                )
            })
            .collect();

        let mut result = SyncResult::default();
        let now = Utc::now().timestamp_millis();

        for candidate in &candidates {
            let key = candidate_key(candidate);
            match current_by_key.remove(&key) {
                Some(existing) => {
                    let display = candidate.display_text.as_deref();
                    if existing.link_type != candidate.link_type
                        || existing.display_text.as_deref() != display
                    {
                        db::refs::update_reference(&tx, &existing.id, candidate.link_type, display)?;
                        result.updated += 1;
                    }
                }
                None => {
                    db::refs::insert_reference(
                        &tx,
                        &ReferenceRow {
                            id: Ulid::new().to_string(),
                            source_type: source_type.to_string(),
                            source_id: source_id.to_string(),
                            target_type: key.0,
                            target_id: key.1,
                            link_type: candidate.link_type,
                            display_text: candidate.display_text.clone(),
                            position: key.2,
                            created_at: now,
                        },
                    )?;
                    result.created += 1;
                }
            }
        }

        // Whatever remains was not re-parsed from the snapshot.
        for stale in current_by_key.values() {
            db::refs::delete_reference(&tx, stale)?;
            result.deleted += 1;
        }

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        if !result.is_noop() {
            tracing::debug!(
                source_type,
                source_id,
                created = result.created,
                updated = result.updated,
                deleted = result.deleted,
                "synced references"
            );
        }

        Ok(result)
    }

    /// Cascade delete for a removed content unit
    ///
    /// Removes references where the unit is source or target, adjusting
    /// counters for the targets it pointed at and dropping its own
    /// counter row. Returns the number of references removed.
    pub fn delete_source(&self, unit_type: &str, unit_id: &str) -> Result<usize> {
        let tx = self
            .db
            .conn()
            .unchecked_transaction()
            .map_err(|e| EngineError::transaction("start", e))?;

        let outgoing = db::refs::load_references(&tx, unit_type, unit_id)?;
        let mut removed = outgoing.len();
        for reference in &outgoing {
            db::refs::delete_reference(&tx, reference)?;
        }

        removed += tx
            .execute(
                "DELETE FROM refs WHERE target_type = ?1 AND target_id = ?2",
                rusqlite::params![unit_type, unit_id],
            )
            .map_err(|e| EngineError::db_operation("delete incoming references", e))?;

        tx.execute(
            "DELETE FROM ref_stats WHERE target_type = ?1 AND target_id = ?2",
            rusqlite::params![unit_type, unit_id],
        )
        .map_err(|e| EngineError::db_operation("delete reference stats", e))?;

        tx.commit()
            .map_err(|e| EngineError::transaction("commit", e))?;

        tracing::debug!(unit_type, unit_id, removed, "deleted content unit from graph");
        Ok(removed)
    }

    /// All references pointing at a target, newest first
    pub fn backlinks(&self, target_type: &str, target_id: &str) -> Result<Vec<ReferenceRow>> {
        self.db.backlinks(target_type, target_id)
    }

    /// Indexed units of a type with no incoming references
    pub fn orphans(&self, doc_type: &str) -> Result<Vec<String>> {
        self.db.orphans(doc_type)
    }

    /// Most-referenced targets as `(target_type, target_id, count)`
    pub fn popular_targets(&self, limit: usize) -> Result<Vec<(String, String, i64)>> {
        self.db.popular_targets(limit)
    }

    /// Referenced targets with no indexed document behind them
    pub fn dangling_targets(&self) -> Result<Vec<(String, String)>> {
        self.db.dangling_targets()
    }
}

fn candidate_key(candidate: &ReferenceCandidate) -> (String, String, i64) {
    (
        candidate.link_type.target_type().to_string(),
        candidate.target.clone(),
        candidate.start as i64,
    )
}
