//! BRICKMAP Snapshot - XML exchange format
//!
//! One document per entity type: a `<colormaps>` or `<partmaps>` root holding
//! one empty `<colormap …/>` / `<partmap …/>` element per record. Color codes
//! carry the catalog sentinels, flags are `"0"`/`"1"`, and timestamps use the
//! `YYYY-MM-DD HH:MM:SS[.fraction]` UTC form.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{read_snapshot, SnapshotReader};
pub use record::{Attributes, SnapshotRecord};
pub use writer::{write_snapshot, SnapshotWriter};
