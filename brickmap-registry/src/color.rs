//! Color mapping registry.
//!
//! Holds a whole-table cache of colors keyed by id. The cache is rebuilt from
//! the store on [`ColorRegistry::refresh`] and after every write; it is never
//! patched in place. Id 0 always resolves to the "Unknown" color.

use crate::Upserted;
use brickmap_core::{
    start_of_day, BrickmapResult, Catalog, ColorEquivalence, ColorFilter, IntegrityError, MapId,
    Timestamp, ValidationError, UNKNOWN_COLOR_ID,
};
use brickmap_storage::MappingStore;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

pub struct ColorRegistry<S: MappingStore + ?Sized> {
    store: Arc<S>,
    cache: RwLock<BTreeMap<MapId, ColorEquivalence>>,
}

fn sentinel_cache() -> BTreeMap<MapId, ColorEquivalence> {
    BTreeMap::from([(UNKNOWN_COLOR_ID, ColorEquivalence::unknown())])
}

impl<S: MappingStore + ?Sized> ColorRegistry<S> {
    /// Registry with a cache holding only the sentinel. Call
    /// [`refresh`](Self::refresh) to load the table.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: RwLock::new(sentinel_cache()),
        }
    }

    // === Cache ===

    /// Rebuild the cache from a full table scan.
    pub fn refresh(&self) -> BrickmapResult<()> {
        let mut fresh = sentinel_cache();
        for color in self.store.color_list()? {
            fresh.insert(color.map_id, color);
        }
        let size = fresh.len();
        *self.cache.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        debug!(entries = size, "Refreshed color cache");
        Ok(())
    }

    /// Cached color for `id`, or the "Unknown" color.
    pub fn lookup(&self, id: MapId) -> ColorEquivalence {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&id)
            .cloned()
            .unwrap_or_else(ColorEquivalence::unknown)
    }

    /// Sorted ids currently cached, sentinel included.
    pub fn cached_ids(&self) -> Vec<MapId> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.keys().copied().collect()
    }

    // === Queries ===

    /// The color holding `code` in `catalog`.
    ///
    /// The catalog's absent-code sentinel never matches. More than one match
    /// means the uniqueness invariant was broken outside this registry and is
    /// reported as an integrity violation.
    pub fn lookup_by_code(
        &self,
        catalog: Catalog,
        code: i32,
    ) -> BrickmapResult<Option<ColorEquivalence>> {
        if code == catalog.absent_color_code() {
            return Ok(None);
        }
        let mut matches = self.store.color_find_by_code(catalog, code)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(IntegrityError::DuplicateColorCode {
                catalog,
                code,
                ids: matches.iter().map(|c| c.map_id).collect(),
            }
            .into()),
        }
    }

    pub fn list(&self, filter: &ColorFilter) -> BrickmapResult<Vec<ColorEquivalence>> {
        let mut colors = self.store.color_list()?;
        colors.retain(|c| filter.matches(c));
        Ok(colors)
    }

    /// Rows in the store (the sentinel is not stored).
    pub fn count(&self) -> BrickmapResult<usize> {
        self.store.color_count()
    }

    /// Colors modified at or after `since`, ordered by id.
    pub fn export_since(&self, since: Timestamp) -> BrickmapResult<Vec<ColorEquivalence>> {
        self.store.color_modified_since(since)
    }

    pub fn export_all(&self) -> BrickmapResult<Vec<ColorEquivalence>> {
        self.store.color_list()
    }

    /// Up to `limit` distinct modification days, most recent first, as
    /// start-of-day UTC timestamps.
    pub fn modified_buckets(&self, limit: usize) -> BrickmapResult<Vec<Timestamp>> {
        Ok(self
            .store
            .color_modified_dates(limit)?
            .into_iter()
            .map(start_of_day)
            .collect())
    }

    // === Writes ===

    /// Reject `color` if another record already holds one of its codes.
    /// A code equal to its catalog's absent sentinel counts as absent.
    pub fn validate(&self, color: &ColorEquivalence) -> BrickmapResult<()> {
        let color = color.normalized_codes();
        for catalog in Catalog::ALL {
            let Some(code) = color.code(catalog) else {
                continue;
            };
            let existing = self
                .store
                .color_find_by_code(catalog, code)?
                .into_iter()
                .find(|other| other.map_id != color.map_id);
            if let Some(existing) = existing {
                return Err(ValidationError::DuplicateColorCode {
                    catalog,
                    code,
                    candidate_id: color.map_id,
                    existing: Box::new(existing),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate, then update `color` if its id is stored or insert it under
    /// a new id. Refreshes the cache. Returns the stored id.
    pub fn upsert(&self, color: &ColorEquivalence) -> BrickmapResult<MapId> {
        let outcome = self.write(color)?;
        self.refresh()?;
        Ok(outcome.id())
    }

    /// Validate and write without touching the cache.
    pub(crate) fn write(&self, color: &ColorEquivalence) -> BrickmapResult<Upserted> {
        let color = color.normalized_codes();
        self.validate(&color)?;
        if color.map_id != UNKNOWN_COLOR_ID && self.store.color_get(color.map_id)?.is_some() {
            self.store.color_update(&color)?;
            Ok(Upserted::Updated(color.map_id))
        } else {
            self.store.color_insert(&color).map(Upserted::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brickmap_core::{BrickmapError, Table};
    use brickmap_storage::MockStore;
    use brickmap_test_utils::fixtures;

    fn registry() -> ColorRegistry<MockStore> {
        let store = MockStore::new();
        store.create_table(Table::Colors).unwrap();
        ColorRegistry::new(Arc::new(store))
    }

    #[test]
    fn test_lookup_unknown_before_refresh() {
        let registry = registry();
        let color = registry.lookup(0);
        assert!(color.is_unknown());
        assert_eq!(color.name, "Unknown");
        assert_eq!(registry.lookup(42).map_id, 0);
        assert_eq!(registry.cached_ids(), vec![0]);
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let registry = registry();
        let id = registry.upsert(&fixtures::bright_red()).unwrap();
        assert!(id > 0);
        assert_eq!(registry.lookup(id).name, "Bright Red");

        let renamed = registry.lookup(id).with_name("Red");
        assert_eq!(registry.upsert(&renamed).unwrap(), id);
        assert_eq!(registry.lookup(id).name, "Red");
        assert_eq!(registry.count().unwrap(), 1);
        assert_eq!(registry.cached_ids(), vec![0, id]);
    }

    #[test]
    fn test_upsert_unknown_id_inserts() {
        let registry = registry();
        let id = registry.upsert(&fixtures::black().with_id(99)).unwrap();
        assert_ne!(id, 99);
        assert_eq!(registry.lookup(id).open_format, Some(0));
    }

    #[test]
    fn test_duplicate_code_rejected() {
        let registry = registry();
        let red = registry.upsert(&fixtures::bright_red()).unwrap();

        let clash = ColorEquivalence::new(None, Some(5), None).with_name("Other red");
        let err = registry.upsert(&clash).unwrap_err();
        match err {
            BrickmapError::Validation(ValidationError::DuplicateColorCode {
                catalog,
                code,
                existing,
                ..
            }) => {
                assert_eq!(catalog, Catalog::Marketplace);
                assert_eq!(code, 5);
                assert_eq!(existing.map_id, red);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(registry.count().unwrap(), 1);
    }

    #[test]
    fn test_validate_ignores_own_record() {
        let registry = registry();
        let id = registry.upsert(&fixtures::bright_red()).unwrap();
        assert!(registry.validate(&registry.lookup(id)).is_ok());
    }

    #[test]
    fn test_absent_codes_never_collide() {
        let registry = registry();
        registry
            .upsert(&ColorEquivalence::new(Some(1), None, None))
            .unwrap();
        registry
            .upsert(&ColorEquivalence::new(Some(2), None, None))
            .unwrap();
        assert_eq!(registry.count().unwrap(), 2);
    }

    #[test]
    fn test_lookup_by_code() {
        let registry = registry();
        let id = registry.upsert(&fixtures::black()).unwrap();
        let found = registry.lookup_by_code(Catalog::OpenFormat, 0).unwrap();
        assert_eq!(found.map(|c| c.map_id), Some(id));
        assert!(registry
            .lookup_by_code(Catalog::Primary, 999)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sentinel_codes_never_match() {
        for (name, store) in fixtures::all_stores() {
            store.create_table(Table::Colors).unwrap();
            let registry = ColorRegistry::new(store);
            registry
                .upsert(&ColorEquivalence::new(None, None, Some(4)).with_name("Red"))
                .unwrap();
            registry
                .upsert(&ColorEquivalence::new(None, None, Some(14)).with_name("Yellow"))
                .unwrap();
            for catalog in [Catalog::Primary, Catalog::Marketplace] {
                let found = registry.lookup_by_code(catalog, 0).unwrap();
                assert!(found.is_none(), "{name}: {catalog}");
            }
            let found = registry.lookup_by_code(Catalog::OpenFormat, -1).unwrap();
            assert!(found.is_none(), "{name}");
        }
    }

    #[test]
    fn test_sentinel_code_written_as_absent() {
        for (name, store) in fixtures::all_stores() {
            store.create_table(Table::Colors).unwrap();
            let registry = ColorRegistry::new(store);
            registry
                .upsert(&ColorEquivalence::new(None, Some(5), None))
                .unwrap();
            let id = registry
                .upsert(&ColorEquivalence::new(Some(0), Some(11), Some(-1)))
                .unwrap_or_else(|e| panic!("{name}: {e}"));
            let stored = registry.lookup(id);
            assert_eq!(stored.primary, None, "{name}");
            assert_eq!(stored.open_format, None, "{name}");
            assert_eq!(stored.marketplace, Some(11), "{name}");
        }
    }

    #[test]
    fn test_lookup_by_code_reports_corruption() {
        let store = Arc::new(MockStore::new());
        store.create_table(Table::Colors).unwrap();
        // Bypass validation to simulate corrupted data
        store.color_insert(&fixtures::white()).unwrap();
        store.color_insert(&fixtures::white()).unwrap();
        let registry = ColorRegistry::new(store);
        let err = registry.lookup_by_code(Catalog::Primary, 1).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_list_with_filter() {
        let registry = registry();
        for color in fixtures::standard_colors() {
            registry.upsert(&color).unwrap();
        }
        let transparent = registry.list(&ColorFilter::new().transparent(true)).unwrap();
        assert_eq!(transparent.len(), 1);
        assert_eq!(transparent[0].name, "Trans-Clear");
        let primary = registry
            .list(&ColorFilter::new().has_code_in(Catalog::Primary))
            .unwrap();
        assert_eq!(primary.len(), 3);
    }

    #[test]
    fn test_cache_is_not_patched_by_direct_store_writes() {
        let store = Arc::new(MockStore::new());
        store.create_table(Table::Colors).unwrap();
        let registry = ColorRegistry::new(Arc::clone(&store));
        let id = store.color_insert(&fixtures::white()).unwrap();
        assert!(registry.lookup(id).is_unknown());
        registry.refresh().unwrap();
        assert_eq!(registry.lookup(id).name, "White");
    }
}
