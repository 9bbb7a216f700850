//! Part mapping registry.
//!
//! Translation lookups, per-direction uniqueness validation, ranked free-text
//! search and bulk sessions. A bulk session drops the full-text index, runs
//! every write inside one transaction and rebuilds the index when it ends,
//! whether by commit or by rollback.

use crate::Upserted;
use brickmap_core::{
    start_of_day, BrickmapResult, Direction, IntegrityError, MapId, PartEquivalence, PartFilter,
    StorageError, Table, Timestamp, ValidationError,
};
use brickmap_storage::{MappingStore, PART_TEXT_COLUMNS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default width of the [`PartRegistry::recent_changes`] window.
pub const DEFAULT_RECENT_WINDOW_MINUTES: i64 = 15;

pub struct PartRegistry<S: MappingStore + ?Sized> {
    store: Arc<S>,
    recent_window: chrono::Duration,
    in_session: AtomicBool,
}

impl<S: MappingStore + ?Sized> PartRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            recent_window: chrono::Duration::minutes(DEFAULT_RECENT_WINDOW_MINUTES),
            in_session: AtomicBool::new(false),
        }
    }

    pub fn with_recent_window(mut self, window: chrono::Duration) -> Self {
        self.recent_window = window;
        self
    }

    /// Build the full-text index if it is missing.
    pub fn init(&self) -> BrickmapResult<()> {
        if !self.store.fulltext_exists(Table::PartMapping)? {
            self.rebuild_index()?;
        }
        Ok(())
    }

    fn rebuild_index(&self) -> BrickmapResult<()> {
        self.store
            .create_fulltext(Table::PartMapping, &PART_TEXT_COLUMNS)?;
        info!(table = %Table::PartMapping, "Created full-text index");
        Ok(())
    }

    // === Translation ===

    /// The record translating `source_id` along `direction`.
    ///
    /// A missing decoration means "undecorated", not "any decoration".
    pub fn translate(
        &self,
        direction: Direction,
        source_id: &str,
        decoration_id: Option<&str>,
    ) -> BrickmapResult<Option<PartEquivalence>> {
        let decoration_id = decoration_id.unwrap_or("");
        let mut matches = self
            .store
            .part_find_by_source(direction, source_id, decoration_id)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(IntegrityError::DuplicateTranslation {
                direction,
                source_id: source_id.to_string(),
                decoration_id: decoration_id.to_string(),
                ids: matches.iter().map(|p| p.map_id).collect(),
            }
            .into()),
        }
    }

    /// Target catalog id for `source_id`, if mapped to a non-empty id.
    pub fn translate_id(
        &self,
        direction: Direction,
        source_id: &str,
        decoration_id: Option<&str>,
    ) -> BrickmapResult<Option<String>> {
        Ok(self
            .translate(direction, source_id, decoration_id)?
            .map(|p| p.target_id(direction).to_string())
            .filter(|id| !id.is_empty()))
    }

    // === Writes ===

    /// Reject `part` if, for any direction it enables, another record with
    /// that direction already claims the same source id and decoration.
    pub fn validate(&self, part: &PartEquivalence) -> BrickmapResult<()> {
        for direction in part.directions.directions() {
            let existing = self
                .store
                .part_find_by_source(
                    direction,
                    part.source_id(direction),
                    &part.decoration_id,
                )?
                .into_iter()
                .find(|other| other.map_id != part.map_id);
            if let Some(existing) = existing {
                return Err(ValidationError::DuplicatePartMapping {
                    direction,
                    candidate: Box::new(part.clone()),
                    existing: Box::new(existing),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate, then update `part` if its id is stored or insert it under a
    /// new id. Returns the stored id.
    pub fn upsert(&self, part: &PartEquivalence) -> BrickmapResult<MapId> {
        self.write(part).map(|outcome| outcome.id())
    }

    pub(crate) fn write(&self, part: &PartEquivalence) -> BrickmapResult<Upserted> {
        self.validate(part)?;
        if part.map_id != 0 && self.store.part_get(part.map_id)?.is_some() {
            self.store.part_update(part)?;
            Ok(Upserted::Updated(part.map_id))
        } else {
            self.store.part_insert(part).map(Upserted::Inserted)
        }
    }

    /// Trim surrounding whitespace from every text field. Idempotent;
    /// last-modified is untouched. Returns the number of rows changed.
    pub fn cleanup(&self) -> BrickmapResult<usize> {
        let changed = self.store.part_trim_text_fields()?;
        info!(changed, "Trimmed part mapping text fields");
        Ok(changed)
    }

    // === Search ===

    /// Ranked free-text search, best match first, intersected with `filter`.
    ///
    /// A blank query matches nothing. While a bulk session is open the index
    /// does not exist and every search is empty.
    pub fn search(&self, query: &str, filter: &PartFilter) -> BrickmapResult<Vec<PartEquivalence>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if !self.store.fulltext_exists(Table::PartMapping)? {
            debug!(query, "Full-text index absent, search skipped");
            return Ok(Vec::new());
        }
        let hits = self.store.fulltext_search(Table::PartMapping, query)?;
        let mut results = Vec::with_capacity(hits.len());
        for (id, _score) in hits {
            if let Some(part) = self.store.part_get(id)? {
                if filter.matches(&part) {
                    results.push(part);
                }
            }
        }
        Ok(results)
    }

    // === Bulk sessions ===

    pub fn in_bulk_session(&self) -> bool {
        self.in_session.load(Ordering::SeqCst)
    }

    /// Drop the full-text index and open a transaction.
    pub fn begin_bulk_session(&self) -> BrickmapResult<()> {
        if self.in_bulk_session() {
            return Err(StorageError::TransactionFailed {
                reason: "bulk session already open".to_string(),
            }
            .into());
        }
        self.store.drop_fulltext(Table::PartMapping)?;
        if let Err(err) = self.store.set_autocommit(false) {
            if let Err(rebuild_err) = self.rebuild_index() {
                warn!(error = %rebuild_err, "Failed to restore full-text index");
            }
            return Err(err);
        }
        self.in_session.store(true, Ordering::SeqCst);
        info!("Bulk session started");
        Ok(())
    }

    /// Commit the session's writes and rebuild the index.
    pub fn end_bulk_session(&self) -> BrickmapResult<()> {
        self.require_session()?;
        self.store.commit()?;
        self.store.set_autocommit(true)?;
        self.in_session.store(false, Ordering::SeqCst);
        self.rebuild_index()?;
        info!("Bulk session committed");
        Ok(())
    }

    /// Discard the session's writes and rebuild the index.
    pub fn abort_bulk_session(&self) -> BrickmapResult<()> {
        self.require_session()?;
        self.store.rollback()?;
        self.store.set_autocommit(true)?;
        self.in_session.store(false, Ordering::SeqCst);
        self.rebuild_index()?;
        info!("Bulk session rolled back");
        Ok(())
    }

    /// Run `apply` inside a bulk session. Any error aborts the session
    /// before it is returned.
    pub fn with_bulk_session<T, F>(&self, apply: F) -> BrickmapResult<T>
    where
        F: FnOnce(&Self) -> BrickmapResult<T>,
    {
        self.begin_bulk_session()?;
        match apply(self).and_then(|value| self.end_bulk_session().map(|()| value)) {
            Ok(value) => Ok(value),
            Err(err) => {
                if self.in_bulk_session() {
                    if let Err(abort_err) = self.abort_bulk_session() {
                        warn!(error = %abort_err, "Failed to abort bulk session");
                    }
                }
                Err(err)
            }
        }
    }

    fn require_session(&self) -> BrickmapResult<()> {
        if self.in_bulk_session() {
            Ok(())
        } else {
            Err(StorageError::TransactionFailed {
                reason: "no bulk session open".to_string(),
            }
            .into())
        }
    }

    // === Queries ===

    /// Records modified within the recent window before the latest
    /// modification in the table.
    pub fn recent_changes(&self) -> BrickmapResult<Vec<PartEquivalence>> {
        let Some(latest) = self.store.part_latest_modified()? else {
            return Ok(Vec::new());
        };
        let Some(cutoff) = latest.checked_sub_signed(self.recent_window) else {
            // Window reaches past the earliest representable time
            let mut parts = self.store.part_list()?;
            parts.retain(|p| p.last_modified.is_some());
            return Ok(parts);
        };
        let mut parts = self.store.part_modified_since(cutoff)?;
        parts.retain(|p| p.last_modified.is_some_and(|ts| ts > cutoff));
        Ok(parts)
    }

    /// Records with at least one direction enabled.
    pub fn count_rules(&self) -> BrickmapResult<usize> {
        Ok(self
            .store
            .part_list()?
            .iter()
            .filter(|p| p.is_rule())
            .count())
    }

    pub fn count(&self) -> BrickmapResult<usize> {
        self.store.part_count()
    }

    pub fn list(&self, filter: &PartFilter) -> BrickmapResult<Vec<PartEquivalence>> {
        let mut parts = self.store.part_list()?;
        parts.retain(|p| filter.matches(p));
        Ok(parts)
    }

    pub fn export_since(&self, since: Timestamp) -> BrickmapResult<Vec<PartEquivalence>> {
        self.store.part_modified_since(since)
    }

    pub fn export_all(&self) -> BrickmapResult<Vec<PartEquivalence>> {
        self.store.part_list()
    }

    pub fn modified_buckets(&self, limit: usize) -> BrickmapResult<Vec<Timestamp>> {
        Ok(self
            .store
            .part_modified_dates(limit)?
            .into_iter()
            .map(start_of_day)
            .collect())
    }
}
