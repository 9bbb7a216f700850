//! BRICKMAP Storage - Store Adapter Trait and Mock Implementation
//!
//! Defines the persistence contract the registries are written against.
//! [`MockStore`] keeps everything in memory; [`SqliteStore`] persists to
//! SQLite with an FTS5 full-text index.
//!
//! Stores assign ids and last-modified timestamps. Records are never deleted.

pub mod fulltext;
pub mod sqlite;

pub use fulltext::{text_columns, PART_TEXT_COLUMNS};
pub use sqlite::SqliteStore;

use brickmap_core::{
    BrickmapError, BrickmapResult, Catalog, ColorEquivalence, Direction, MapId, PartEquivalence,
    StorageError, Table, Timestamp,
};
use chrono::{NaiveDate, SubsecRound, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Current time at the precision every store persists (microseconds).
pub fn store_now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Persistence contract for color and part mappings.
///
/// Transactions follow the auto-commit toggle model: disabling auto-commit
/// opens a transaction, `commit`/`rollback` close it and immediately open the
/// next one, and re-enabling auto-commit commits whatever is pending.
pub trait MappingStore: Send + Sync {
    // === Schema ===

    /// Whether `table` exists.
    fn table_exists(&self, table: Table) -> BrickmapResult<bool>;

    /// Create `table` and its lookup indexes unless it already exists.
    fn create_table(&self, table: Table) -> BrickmapResult<()>;

    /// Stored schema version under `key`, if any.
    fn schema_version(&self, key: &str) -> BrickmapResult<Option<i32>>;

    /// Record the schema version under `key`.
    fn set_schema_version(&self, key: &str, version: i32) -> BrickmapResult<()>;

    // === Transactions ===

    /// Toggle auto-commit mode.
    fn set_autocommit(&self, enabled: bool) -> BrickmapResult<()>;

    /// Whether auto-commit mode is on.
    fn is_autocommit(&self) -> BrickmapResult<bool>;

    /// Commit the open transaction and start a new one.
    fn commit(&self) -> BrickmapResult<()>;

    /// Discard the open transaction and start a new one.
    fn rollback(&self) -> BrickmapResult<()>;

    // === Full-text index ===

    /// Whether a full-text index exists on `table`.
    fn fulltext_exists(&self, table: Table) -> BrickmapResult<bool>;

    /// Build a full-text index over `columns` of `table`.
    fn create_fulltext(&self, table: Table, columns: &[&str]) -> BrickmapResult<()>;

    /// Drop the full-text index on `table`, if present.
    fn drop_fulltext(&self, table: Table) -> BrickmapResult<()>;

    /// Ranked matches for `query` as `(id, score)` pairs, best first.
    fn fulltext_search(&self, table: Table, query: &str) -> BrickmapResult<Vec<(MapId, f32)>>;

    // === Color Operations ===

    /// Insert a color with a generated id. Returns the id.
    fn color_insert(&self, color: &ColorEquivalence) -> BrickmapResult<MapId>;

    /// Overwrite the color with `color.map_id`.
    fn color_update(&self, color: &ColorEquivalence) -> BrickmapResult<()>;

    fn color_get(&self, id: MapId) -> BrickmapResult<Option<ColorEquivalence>>;

    /// All colors ordered by id.
    fn color_list(&self) -> BrickmapResult<Vec<ColorEquivalence>>;

    /// Colors holding `code` in `catalog`.
    fn color_find_by_code(&self, catalog: Catalog, code: i32) -> BrickmapResult<Vec<ColorEquivalence>>;

    /// Colors modified at or after `since`, ordered by id.
    fn color_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<ColorEquivalence>>;

    /// Up to `limit` distinct modification dates, most recent first.
    fn color_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>>;

    fn color_count(&self) -> BrickmapResult<usize>;

    // === Part Operations ===

    /// Insert a part mapping with a generated id. Returns the id.
    fn part_insert(&self, part: &PartEquivalence) -> BrickmapResult<MapId>;

    /// Overwrite the part mapping with `part.map_id`.
    fn part_update(&self, part: &PartEquivalence) -> BrickmapResult<()>;

    fn part_get(&self, id: MapId) -> BrickmapResult<Option<PartEquivalence>>;

    /// All part mappings ordered by id.
    fn part_list(&self) -> BrickmapResult<Vec<PartEquivalence>>;

    /// Records enabling `direction` whose source id and decoration id match.
    fn part_find_by_source(
        &self,
        direction: Direction,
        source_id: &str,
        decoration_id: &str,
    ) -> BrickmapResult<Vec<PartEquivalence>>;

    /// Part mappings modified at or after `since`, ordered by id.
    fn part_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<PartEquivalence>>;

    /// Up to `limit` distinct modification dates, most recent first.
    fn part_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>>;

    /// Most recent modification timestamp in the part table.
    fn part_latest_modified(&self) -> BrickmapResult<Option<Timestamp>>;

    /// Trim surrounding whitespace from every text field.
    /// Leaves last-modified untouched. Returns the number of rows changed.
    fn part_trim_text_fields(&self) -> BrickmapResult<usize>;

    fn part_count(&self) -> BrickmapResult<usize>;
}

// ============================================================================
// MOCK STORE
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MockState {
    tables: BTreeSet<Table>,
    colors: BTreeMap<MapId, ColorEquivalence>,
    parts: BTreeMap<MapId, PartEquivalence>,
    last_color_id: MapId,
    last_part_id: MapId,
    ledger: HashMap<String, i32>,
    /// Indexed columns per table
    fulltext: BTreeMap<Table, Vec<String>>,
}

impl MockState {
    fn require(&self, table: Table) -> BrickmapResult<()> {
        if self.tables.contains(&table) {
            Ok(())
        } else {
            Err(StorageError::TableMissing { table }.into())
        }
    }
}

/// In-memory store for tests and database-free embedding.
#[derive(Debug, Default)]
pub struct MockStore {
    state: Arc<RwLock<MockState>>,
    /// State at the start of the open transaction; `None` in auto-commit mode
    checkpoint: Arc<RwLock<Option<MockState>>>,
    /// Frozen clock for deterministic timestamps
    clock: Arc<RwLock<Option<Timestamp>>>,
    /// Operations forced to fail
    faults: Arc<RwLock<BTreeSet<MockFault>>>,
}

/// Store operation a [`MockStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MockFault {
    /// Disabling auto-commit
    BeginTransaction,
    /// Listing the color table
    ListColors,
}

fn poisoned<T>(_: T) -> BrickmapError {
    StorageError::LockPoisoned.into()
}

impl MockStore {
    /// Create a new mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp every following write with `at`.
    pub fn freeze_clock(&self, at: Timestamp) {
        let mut clock = self.clock.write().unwrap_or_else(|e| e.into_inner());
        *clock = Some(at);
    }

    /// Move a frozen clock forward by `by`. No effect on a live clock.
    pub fn advance_clock(&self, by: chrono::Duration) {
        let mut clock = self.clock.write().unwrap_or_else(|e| e.into_inner());
        if let Some(at) = clock.as_mut() {
            *at += by;
        }
    }

    /// Fail every following `fault` operation until cleared.
    pub fn inject_fault(&self, fault: MockFault) {
        let mut faults = self.faults.write().unwrap_or_else(|e| e.into_inner());
        faults.insert(fault);
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults.write().unwrap_or_else(|e| e.into_inner());
        faults.clear();
    }

    fn check_fault(&self, fault: MockFault) -> BrickmapResult<()> {
        let faults = self.faults.read().unwrap_or_else(|e| e.into_inner());
        if !faults.contains(&fault) {
            return Ok(());
        }
        let reason = format!("injected fault: {:?}", fault);
        Err(match fault {
            MockFault::BeginTransaction => StorageError::TransactionFailed { reason },
            MockFault::ListColors => StorageError::Backend { reason },
        }
        .into())
    }

    fn now(&self) -> Timestamp {
        let clock = self.clock.read().unwrap_or_else(|e| e.into_inner());
        clock.unwrap_or_else(store_now)
    }

    fn read(&self) -> BrickmapResult<RwLockReadGuard<'_, MockState>> {
        self.state.read().map_err(poisoned)
    }

    fn write(&self) -> BrickmapResult<RwLockWriteGuard<'_, MockState>> {
        self.state.write().map_err(poisoned)
    }

    fn modified_dates<'a>(
        stamps: impl Iterator<Item = &'a Option<Timestamp>>,
        limit: usize,
    ) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = stamps.flatten().map(|ts| ts.date_naive()).collect();
        dates.into_iter().rev().take(limit).collect()
    }
}

impl MappingStore for MockStore {
    // === Schema ===

    fn table_exists(&self, table: Table) -> BrickmapResult<bool> {
        Ok(self.read()?.tables.contains(&table))
    }

    fn create_table(&self, table: Table) -> BrickmapResult<()> {
        self.write()?.tables.insert(table);
        Ok(())
    }

    fn schema_version(&self, key: &str) -> BrickmapResult<Option<i32>> {
        Ok(self.read()?.ledger.get(key).copied())
    }

    fn set_schema_version(&self, key: &str, version: i32) -> BrickmapResult<()> {
        self.write()?.ledger.insert(key.to_string(), version);
        Ok(())
    }

    // === Transactions ===

    fn set_autocommit(&self, enabled: bool) -> BrickmapResult<()> {
        let mut checkpoint = self.checkpoint.write().map_err(poisoned)?;
        if enabled {
            *checkpoint = None;
        } else if checkpoint.is_none() {
            self.check_fault(MockFault::BeginTransaction)?;
            *checkpoint = Some(self.read()?.clone());
        }
        Ok(())
    }

    fn is_autocommit(&self) -> BrickmapResult<bool> {
        Ok(self.checkpoint.read().map_err(poisoned)?.is_none())
    }

    fn commit(&self) -> BrickmapResult<()> {
        let mut checkpoint = self.checkpoint.write().map_err(poisoned)?;
        if checkpoint.is_none() {
            return Err(StorageError::TransactionFailed {
                reason: "commit requested in auto-commit mode".to_string(),
            }
            .into());
        }
        *checkpoint = Some(self.read()?.clone());
        Ok(())
    }

    fn rollback(&self) -> BrickmapResult<()> {
        let checkpoint = self.checkpoint.read().map_err(poisoned)?;
        let saved = checkpoint.as_ref().ok_or_else(|| StorageError::TransactionFailed {
            reason: "rollback requested in auto-commit mode".to_string(),
        })?;
        *self.write()? = saved.clone();
        Ok(())
    }

    // === Full-text index ===

    fn fulltext_exists(&self, table: Table) -> BrickmapResult<bool> {
        Ok(self.read()?.fulltext.contains_key(&table))
    }

    fn create_fulltext(&self, table: Table, columns: &[&str]) -> BrickmapResult<()> {
        let mut state = self.write()?;
        state.require(table)?;
        let allowed = text_columns(table);
        if columns.is_empty() {
            return Err(StorageError::IndexError {
                index_name: format!("{}_fts", table),
                reason: "no columns given".to_string(),
            }
            .into());
        }
        if let Some(bad) = columns.iter().find(|c| !allowed.contains(*c)) {
            return Err(StorageError::IndexError {
                index_name: format!("{}_fts", table),
                reason: format!("column '{}' cannot be indexed", bad),
            }
            .into());
        }
        state
            .fulltext
            .insert(table, columns.iter().map(|c| c.to_string()).collect());
        Ok(())
    }

    fn drop_fulltext(&self, table: Table) -> BrickmapResult<()> {
        self.write()?.fulltext.remove(&table);
        Ok(())
    }

    fn fulltext_search(&self, table: Table, query: &str) -> BrickmapResult<Vec<(MapId, f32)>> {
        let state = self.read()?;
        let columns = state
            .fulltext
            .get(&table)
            .ok_or_else(|| StorageError::IndexError {
                index_name: format!("{}_fts", table),
                reason: "index does not exist".to_string(),
            })?;
        let terms = fulltext::tokenize(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Only the part table can carry an index
        let documents: Vec<(MapId, Vec<String>)> = state
            .parts
            .values()
            .map(|p| {
                let text: Vec<&str> = columns
                    .iter()
                    .filter_map(|c| fulltext::part_column(p, c))
                    .collect();
                (p.map_id, fulltext::tokenize(&text.join(" ")))
            })
            .collect();

        let mut hits: Vec<(MapId, f32)> = documents
            .iter()
            .filter_map(|(id, tokens)| fulltext::score(&terms, tokens).map(|s| (*id, s)))
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }

    // === Color Operations ===

    fn color_insert(&self, color: &ColorEquivalence) -> BrickmapResult<MapId> {
        let now = self.now();
        let mut state = self.write()?;
        state.require(Table::Colors)?;
        state.last_color_id += 1;
        let id = state.last_color_id;
        let mut stored = color.clone();
        stored.map_id = id;
        stored.last_modified = Some(now);
        state.colors.insert(id, stored);
        Ok(id)
    }

    fn color_update(&self, color: &ColorEquivalence) -> BrickmapResult<()> {
        let now = self.now();
        let mut state = self.write()?;
        state.require(Table::Colors)?;
        let slot = state
            .colors
            .get_mut(&color.map_id)
            .ok_or(StorageError::NotFound {
                table: Table::Colors,
                id: color.map_id,
            })?;
        *slot = color.clone();
        slot.last_modified = Some(now);
        Ok(())
    }

    fn color_get(&self, id: MapId) -> BrickmapResult<Option<ColorEquivalence>> {
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(state.colors.get(&id).cloned())
    }

    fn color_list(&self) -> BrickmapResult<Vec<ColorEquivalence>> {
        self.check_fault(MockFault::ListColors)?;
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(state.colors.values().cloned().collect())
    }

    fn color_find_by_code(&self, catalog: Catalog, code: i32) -> BrickmapResult<Vec<ColorEquivalence>> {
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(state
            .colors
            .values()
            .filter(|c| code != catalog.absent_color_code() && c.code(catalog) == Some(code))
            .cloned()
            .collect())
    }

    fn color_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<ColorEquivalence>> {
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(state
            .colors
            .values()
            .filter(|c| c.last_modified.is_some_and(|m| m >= since))
            .cloned()
            .collect())
    }

    fn color_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>> {
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(Self::modified_dates(
            state.colors.values().map(|c| &c.last_modified),
            limit,
        ))
    }

    fn color_count(&self) -> BrickmapResult<usize> {
        let state = self.read()?;
        state.require(Table::Colors)?;
        Ok(state.colors.len())
    }

    // === Part Operations ===

    fn part_insert(&self, part: &PartEquivalence) -> BrickmapResult<MapId> {
        let now = self.now();
        let mut state = self.write()?;
        state.require(Table::PartMapping)?;
        state.last_part_id += 1;
        let id = state.last_part_id;
        let mut stored = part.clone();
        stored.map_id = id;
        stored.last_modified = Some(now);
        state.parts.insert(id, stored);
        Ok(id)
    }

    fn part_update(&self, part: &PartEquivalence) -> BrickmapResult<()> {
        let now = self.now();
        let mut state = self.write()?;
        state.require(Table::PartMapping)?;
        let slot = state
            .parts
            .get_mut(&part.map_id)
            .ok_or(StorageError::NotFound {
                table: Table::PartMapping,
                id: part.map_id,
            })?;
        *slot = part.clone();
        slot.last_modified = Some(now);
        Ok(())
    }

    fn part_get(&self, id: MapId) -> BrickmapResult<Option<PartEquivalence>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state.parts.get(&id).cloned())
    }

    fn part_list(&self) -> BrickmapResult<Vec<PartEquivalence>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state.parts.values().cloned().collect())
    }

    fn part_find_by_source(
        &self,
        direction: Direction,
        source_id: &str,
        decoration_id: &str,
    ) -> BrickmapResult<Vec<PartEquivalence>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state
            .parts
            .values()
            .filter(|p| {
                p.enables(direction)
                    && p.source_id(direction) == source_id
                    && p.decoration_id == decoration_id
            })
            .cloned()
            .collect())
    }

    fn part_modified_since(&self, since: Timestamp) -> BrickmapResult<Vec<PartEquivalence>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state
            .parts
            .values()
            .filter(|p| p.last_modified.is_some_and(|m| m >= since))
            .cloned()
            .collect())
    }

    fn part_modified_dates(&self, limit: usize) -> BrickmapResult<Vec<NaiveDate>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(Self::modified_dates(
            state.parts.values().map(|p| &p.last_modified),
            limit,
        ))
    }

    fn part_latest_modified(&self) -> BrickmapResult<Option<Timestamp>> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state.parts.values().filter_map(|p| p.last_modified).max())
    }

    fn part_trim_text_fields(&self) -> BrickmapResult<usize> {
        let mut state = self.write()?;
        state.require(Table::PartMapping)?;
        let mut changed = 0;
        for part in state.parts.values_mut() {
            let trimmed = part.trimmed();
            if trimmed != *part {
                *part = trimmed;
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn part_count(&self) -> BrickmapResult<usize> {
        let state = self.read()?;
        state.require(Table::PartMapping)?;
        Ok(state.parts.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Generated ids are strictly increasing and listing is ordered by id.
        #[test]
        fn prop_generated_ids_increase(designs in prop::collection::vec("[0-9]{3,5}", 1..20)) {
            let store = MockStore::new();
            store.create_table(Table::PartMapping).unwrap();
            let mut last = 0;
            for design in &designs {
                let id = store.part_insert(&PartEquivalence::new(design.clone(), "", "")).unwrap();
                prop_assert!(id > last);
                last = id;
            }
            let ids: Vec<MapId> = store.part_list().unwrap().iter().map(|p| p.map_id).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(ids, sorted);
            prop_assert_eq!(store.part_count().unwrap(), designs.len());
        }
    }
}
