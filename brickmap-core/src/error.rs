//! Error types for BRICKMAP operations

use crate::{Catalog, ColorEquivalence, Direction, MapId, PartEquivalence, Table};
use thiserror::Error;

/// Storage layer errors (connectivity, IO, transaction plumbing).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Backend failure: {reason}")]
    Backend { reason: String },

    #[error("Record not found in {table}: id {id}")]
    NotFound { table: Table, id: MapId },

    #[error("Table {table} does not exist")]
    TableMissing { table: Table },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Index error on {index_name}: {reason}")]
    IndexError { index_name: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },
}

/// A write would break a uniqueness invariant. Rejected before persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error(
        "Duplicated color definition: {catalog} code {code} of color {candidate_id} is already defined by {}",
        describe_color(.existing)
    )]
    DuplicateColorCode {
        catalog: Catalog,
        code: i32,
        candidate_id: MapId,
        existing: Box<ColorEquivalence>,
    },

    #[error("Duplicated part mapping {direction}: {}", describe_part_conflict(.direction, .candidate, .existing))]
    DuplicatePartMapping {
        direction: Direction,
        candidate: Box<PartEquivalence>,
        existing: Box<PartEquivalence>,
    },
}

impl ValidationError {
    /// Id of the record already holding the key.
    pub fn conflicting_id(&self) -> MapId {
        match self {
            ValidationError::DuplicateColorCode { existing, .. } => existing.map_id,
            ValidationError::DuplicatePartMapping { existing, .. } => existing.map_id,
        }
    }
}

fn describe_color(existing: &ColorEquivalence) -> String {
    format!(
        "color {} (primary={:?} marketplace={:?} open_format={:?})",
        existing.map_id, existing.primary, existing.marketplace, existing.open_format
    )
}

fn describe_part_conflict(
    direction: &Direction,
    candidate: &PartEquivalence,
    existing: &PartEquivalence,
) -> String {
    format!(
        "{} (decoration '{}') -> {} is already mapped by {} -> {}",
        candidate.source_id(*direction),
        candidate.decoration_id,
        candidate.target_id(*direction),
        existing,
        existing.target_id(*direction)
    )
}

/// Malformed snapshot input. Fails the current record only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("<{element}> attribute '{attribute}' is not a number: '{value}'")]
    InvalidNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("<{element}> attribute '{attribute}' out of range: {value}")]
    OutOfRange {
        element: &'static str,
        attribute: &'static str,
        value: i64,
    },

    #[error("<{element}> has an unparseable timestamp: '{value}'")]
    InvalidTimestamp { element: &'static str, value: String },

    #[error("XML error at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    #[error("Snapshot IO error: {reason}")]
    Io { reason: String },
}

/// A lookup that must match at most one record matched several.
/// Indicates corrupted data; never repaired automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Internal error: duplicated {catalog} color code {code} in records {ids:?}")]
    DuplicateColorCode {
        catalog: Catalog,
        code: i32,
        ids: Vec<MapId>,
    },

    #[error(
        "Internal error: duplicated part mapping {direction} for '{source_id}' (decoration '{decoration_id}') in records {ids:?}"
    )]
    DuplicateTranslation {
        direction: Direction,
        source_id: String,
        decoration_id: String,
        ids: Vec<MapId>,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Master error type for all BRICKMAP errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrickmapError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Integrity violation: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl BrickmapError {
    /// Whether this is a uniqueness conflict the caller may resolve and retry.
    pub fn is_validation(&self) -> bool {
        matches!(self, BrickmapError::Validation(_))
    }

    /// Whether this reports corrupted stored data.
    pub fn is_integrity(&self) -> bool {
        matches!(self, BrickmapError::Integrity(_))
    }
}

/// Result type alias for BRICKMAP operations.
pub type BrickmapResult<T> = Result<T, BrickmapError>;

// =============================================================================
// TESTS
// =============================================================================
