//! BRICKMAP Test Utilities
//!
//! Shared test infrastructure for the BRICKMAP workspace:
//! - Proptest generators for colors, parts, directions and timestamps
//! - Fixtures with well-known catalog entries
//! - Store constructors covering every store implementation
//! - Assertions for the error taxonomy

// Re-export stores from their source crate
pub use brickmap_storage::{MappingStore, MockStore, SqliteStore};

// Re-export core types for convenience
pub use brickmap_core::{
    BrickmapConfig, BrickmapError, BrickmapResult, Catalog, ColorEquivalence, Direction,
    DirectionSet, FormatError, IntegrityError, MapId, PartEquivalence, Rgba, StorageError, Table,
    Timestamp, ValidationError,
};

use std::sync::Arc;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating BRICKMAP records.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp with microsecond precision (2010-2030).
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1262304000i64..1893456000i64, 0u32..1_000_000).prop_map(|(secs, micros)| {
            chrono::DateTime::from_timestamp(secs, micros * 1000).unwrap_or_default()
        })
    }

    pub fn arb_catalog() -> impl Strategy<Value = Catalog> {
        prop::sample::select(Catalog::ALL.to_vec())
    }

    pub fn arb_direction() -> impl Strategy<Value = Direction> {
        prop::sample::select(Direction::ALL.to_vec())
    }

    pub fn arb_direction_set() -> impl Strategy<Value = DirectionSet> {
        any::<u8>().prop_map(DirectionSet::from_bits_truncate)
    }

    pub fn arb_rgba() -> impl Strategy<Value = Rgba> {
        any::<[u8; 4]>().prop_map(|[r, g, b, a]| Rgba::new(r, g, b, a))
    }

    /// Color code that is never the catalog's "absent" sentinel.
    pub fn arb_color_code(catalog: Catalog) -> impl Strategy<Value = Option<i32>> {
        let low = catalog.absent_color_code() + 1;
        prop::option::of(low..(low + 500))
    }

    /// Generate a stored-looking ColorEquivalence (id and timestamp set).
    pub fn arb_color() -> impl Strategy<Value = ColorEquivalence> {
        (
            (
                1i32..10_000,
                arb_color_code(Catalog::Primary),
                arb_color_code(Catalog::Marketplace),
                arb_color_code(Catalog::OpenFormat),
            ),
            arb_rgba(),
            "[A-Za-z][A-Za-z0-9 .&'<>\"-]{0,24}",
            0i32..20,
            "[ -~]{0,30}",
            any::<[bool; 4]>(),
            prop::option::of(arb_timestamp()),
        )
            .prop_map(
                |(
                    (map_id, primary, marketplace, open_format),
                    color,
                    name,
                    group,
                    notes,
                    [in_production, metallic, transparent, glitter],
                    last_modified,
                )| ColorEquivalence {
                    map_id,
                    primary,
                    marketplace,
                    open_format,
                    color,
                    name,
                    group,
                    notes,
                    in_production,
                    metallic,
                    transparent,
                    glitter,
                    last_modified,
                },
            )
    }

    /// Generate a stored-looking PartEquivalence (id and timestamp set).
    pub fn arb_part() -> impl Strategy<Value = PartEquivalence> {
        (
            1i32..100_000,
            "[0-9]{3,5}",
            "[0-9]{3,5}[a-z]?",
            prop_oneof![Just(String::new()), "[0-9]{3,5}"],
            "[A-Za-z0-9 ]{0,30}",
            "[0-9]{3,5}([a-z]{1,2}[0-9]{2})?",
            prop_oneof![Just(String::new()), "[0-9]{3,5}[a-z]?\\.dat"],
            arb_direction_set(),
            prop::option::of(arb_timestamp()),
        )
            .prop_map(
                |(
                    map_id,
                    master_id,
                    design_id,
                    decoration_id,
                    name,
                    marketplace_id,
                    open_format_id,
                    directions,
                    last_modified,
                )| PartEquivalence {
                    map_id,
                    master_id,
                    design_id,
                    decoration_id,
                    name,
                    marketplace_id,
                    open_format_id,
                    directions,
                    last_modified,
                },
            )
    }

    /// Generate an unsaved part (no id, no timestamp).
    pub fn arb_new_part() -> impl Strategy<Value = PartEquivalence> {
        arb_part().prop_map(|p| p.content())
    }

    /// Generate an unsaved color (no id, no timestamp).
    pub fn arb_new_color() -> impl Strategy<Value = ColorEquivalence> {
        arb_color().prop_map(|c| c.content())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Well-known catalog entries and store constructors.

    use super::*;

    /// Bright Red: primary 21, marketplace 5, open-format 4.
    pub fn bright_red() -> ColorEquivalence {
        ColorEquivalence::new(Some(21), Some(5), Some(4))
            .with_color(Rgba::opaque(180, 0, 0))
            .with_name("Bright Red")
            .with_group(1)
            .with_flags(true, false, false, false)
    }

    /// Black: open-format code 0 is a real color.
    pub fn black() -> ColorEquivalence {
        ColorEquivalence::new(Some(26), Some(11), Some(0))
            .with_color(Rgba::opaque(27, 42, 52))
            .with_name("Black")
            .with_group(1)
            .with_flags(true, false, false, false)
    }

    pub fn white() -> ColorEquivalence {
        ColorEquivalence::new(Some(1), Some(1), Some(15))
            .with_color(Rgba::opaque(244, 244, 244))
            .with_name("White")
            .with_group(1)
            .with_flags(true, false, false, false)
    }

    /// Transparent color known only to the marketplace and open format.
    pub fn trans_clear() -> ColorEquivalence {
        ColorEquivalence::new(None, Some(12), Some(47))
            .with_color(Rgba::new(238, 238, 238, 128))
            .with_name("Trans-Clear")
            .with_group(2)
            .with_flags(true, false, true, false)
    }

    pub fn standard_colors() -> Vec<ColorEquivalence> {
        vec![bright_red(), black(), white(), trans_clear()]
    }

    /// Brick 2 x 4, translating in every direction.
    pub fn brick_2x4() -> PartEquivalence {
        PartEquivalence::new("3001", "3001", "3001.dat")
            .with_master("3001")
            .with_name("Brick 2 x 4")
            .with_directions(DirectionSet::all())
    }

    pub fn plate_2x4() -> PartEquivalence {
        PartEquivalence::new("3020", "3020", "3020.dat")
            .with_master("3020")
            .with_name("Plate 2 x 4")
            .with_directions(DirectionSet::all())
    }

    /// Decorated variant of [`brick_2x4`].
    pub fn printed_brick_2x4() -> PartEquivalence {
        PartEquivalence::new("3001", "3001pb001", "3001p01.dat")
            .with_master("3001")
            .with_decoration("4113")
            .with_name("Brick 2 x 4 with Print")
            .with_directions(DirectionSet::PRIMARY_TO_MARKETPLACE | DirectionSet::PRIMARY_TO_OPEN_FORMAT)
    }

    /// Mapping with no direction enabled.
    pub fn unmapped_slope() -> PartEquivalence {
        PartEquivalence::new("3040", "3040b", "")
            .with_master("3040")
            .with_name("Slope 45 2 x 1")
    }

    pub fn standard_parts() -> Vec<PartEquivalence> {
        vec![brick_2x4(), plate_2x4(), printed_brick_2x4(), unmapped_slope()]
    }

    /// One empty instance of every store implementation.
    ///
    /// # Panics
    /// Panics if the in-memory SQLite database cannot be opened.
    pub fn all_stores() -> Vec<(&'static str, Arc<dyn MappingStore>)> {
        vec![
            ("mock", Arc::new(MockStore::new()) as Arc<dyn MappingStore>),
            (
                "sqlite",
                Arc::new(SqliteStore::open_in_memory().expect("in-memory sqlite"))
                    as Arc<dyn MappingStore>,
            ),
        ]
    }

    pub fn minimal_config() -> BrickmapConfig {
        BrickmapConfig::default()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for BRICKMAP error variants.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &BrickmapResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a validation conflict against the record `conflicting_id`.
    #[track_caller]
    pub fn assert_validation_conflict<T: std::fmt::Debug>(
        result: &BrickmapResult<T>,
        conflicting_id: MapId,
    ) {
        match result {
            Err(BrickmapError::Validation(err)) => {
                assert_eq!(err.conflicting_id(), conflicting_id, "Wrong conflicting record");
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_integrity_error<T: std::fmt::Debug>(result: &BrickmapResult<T>) {
        match result {
            Err(BrickmapError::Integrity(_)) => {}
            other => panic!("Expected Integrity error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &BrickmapResult<T>, table: Table) {
        match result {
            Err(BrickmapError::Storage(StorageError::NotFound { table: t, .. })) => {
                assert_eq!(*t, table, "Wrong table in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", table, other),
        }
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &BrickmapResult<T>) {
        match result {
            Err(BrickmapError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_format_error<T: std::fmt::Debug>(result: &BrickmapResult<T>) {
        match result {
            Err(BrickmapError::Format(_)) => {}
            other => panic!("Expected Format error, got: {:?}", other),
        }
    }

    /// Assert two record lists are equal ignoring ids and timestamps.
    #[track_caller]
    pub fn assert_same_parts(left: &[PartEquivalence], right: &[PartEquivalence]) {
        let left: Vec<_> = left.iter().map(PartEquivalence::content).collect();
        let right: Vec<_> = right.iter().map(PartEquivalence::content).collect();
        assert_eq!(left, right);
    }

    #[track_caller]
    pub fn assert_same_colors(left: &[ColorEquivalence], right: &[ColorEquivalence]) {
        let left: Vec<_> = left.iter().map(ColorEquivalence::content).collect();
        let right: Vec<_> = right.iter().map(ColorEquivalence::content).collect();
        assert_eq!(left, right);
    }
}
