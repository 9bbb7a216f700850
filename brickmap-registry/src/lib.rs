//! BRICKMAP Registry - Mapping Registries and Synchronization Service
//!
//! [`ColorRegistry`] and [`PartRegistry`] validate and apply writes against a
//! [`MappingStore`](brickmap_storage::MappingStore); [`MappingService`] ties
//! them to one store with an explicit `init`/`shutdown` lifecycle, schema
//! migrations, incremental export and snapshot import.
//!
//! ```no_run
//! use brickmap_core::{BrickmapConfig, Direction};
//! use brickmap_registry::MappingService;
//!
//! # fn main() -> brickmap_core::BrickmapResult<()> {
//! let config = BrickmapConfig::default().with_database_path("mappings.db");
//! let service = MappingService::open(config)?;
//! let ldraw = service
//!     .parts()
//!     .translate_id(Direction::PrimaryToOpenFormat, "3001", None)?;
//! println!("{:?}", ldraw);
//! service.shutdown()
//! # }
//! ```

pub mod color;
pub mod part;
pub mod service;

pub use color::ColorRegistry;
pub use part::{PartRegistry, DEFAULT_RECENT_WINDOW_MINUTES};
pub use service::{
    ImportPolicy, ImportReport, MappingService, ModifiedRecords, CURRENT_SCHEMA_VERSION,
    UNVERSIONED,
};

use brickmap_core::MapId;

/// How an upsert was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted(MapId),
    Updated(MapId),
}

impl Upserted {
    pub fn id(&self) -> MapId {
        match self {
            Upserted::Inserted(id) | Upserted::Updated(id) => *id,
        }
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
