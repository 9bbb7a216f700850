//! BRICKMAP Core - Entity Types
//!
//! Data types shared by every BRICKMAP crate: the color and part equivalence
//! records, catalog and direction enums, filters, configuration and the error
//! taxonomy. No storage or registry logic lives here.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod filter;
pub mod identity;

pub use config::{BrickmapConfig, DEFAULT_SCHEMA_VERSION_KEY, MAX_RECENT_WINDOW_MINUTES};
pub use entities::{ColorEquivalence, PartEquivalence, Rgba};
pub use enums::{Catalog, Direction, DirectionSet, Table};
pub use error::{
    BrickmapError, BrickmapResult, ConfigError, FormatError, IntegrityError, StorageError,
    ValidationError,
};
pub use filter::{ColorFilter, PartFilter};
pub use identity::{
    compute_content_hash, content_hash_hex, format_timestamp, parse_timestamp, start_of_day,
    ContentHash, MapId, Timestamp, TIMESTAMP_FORMAT, UNKNOWN_COLOR_ID, UNKNOWN_COLOR_NAME,
};

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
