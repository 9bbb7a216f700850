//! Core equivalence records

use crate::{Catalog, Direction, DirectionSet, MapId, Timestamp, UNKNOWN_COLOR_ID, UNKNOWN_COLOR_NAME};
use serde::{Deserialize, Serialize};

// ============================================================================
// COLORS
// ============================================================================

/// RGBA display sample for a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from RGB channels.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Rgba::BLACK
    }
}

/// ColorEquivalence - one color known under up to three catalog codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorEquivalence {
    pub map_id: MapId,
    /// Primary catalog color code
    pub primary: Option<i32>,
    /// Marketplace color code
    pub marketplace: Option<i32>,
    /// Open-format color code (0 is a real color here)
    pub open_format: Option<i32>,
    pub color: Rgba,
    pub name: String,
    /// Index into the classification group table
    pub group: i32,
    pub notes: String,
    pub in_production: bool,
    pub metallic: bool,
    pub transparent: bool,
    pub glitter: bool,
    /// Set by the store on every write
    pub last_modified: Option<Timestamp>,
}

impl Default for ColorEquivalence {
    fn default() -> Self {
        Self {
            map_id: 0,
            primary: None,
            marketplace: None,
            open_format: None,
            color: Rgba::BLACK,
            name: String::new(),
            group: 0,
            notes: String::new(),
            in_production: false,
            metallic: false,
            transparent: false,
            glitter: false,
            last_modified: None,
        }
    }
}

impl ColorEquivalence {
    /// New unsaved color with the given catalog codes.
    pub fn new(primary: Option<i32>, marketplace: Option<i32>, open_format: Option<i32>) -> Self {
        Self {
            primary,
            marketplace,
            open_format,
            ..Default::default()
        }
    }

    /// The reserved id-0 "Unknown" color.
    pub fn unknown() -> Self {
        Self {
            map_id: UNKNOWN_COLOR_ID,
            name: UNKNOWN_COLOR_NAME.to_string(),
            ..Default::default()
        }
    }

    /// Whether this is the id-0 sentinel.
    pub fn is_unknown(&self) -> bool {
        self.map_id == UNKNOWN_COLOR_ID
    }

    /// Code in the given catalog, if present.
    pub fn code(&self, catalog: Catalog) -> Option<i32> {
        match catalog {
            Catalog::Primary => self.primary,
            Catalog::Marketplace => self.marketplace,
            Catalog::OpenFormat => self.open_format,
        }
    }

    pub fn with_id(mut self, map_id: MapId) -> Self {
        self.map_id = map_id;
        self
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_flags(mut self, in_production: bool, metallic: bool, transparent: bool, glitter: bool) -> Self {
        self.in_production = in_production;
        self.metallic = metallic;
        self.transparent = transparent;
        self.glitter = glitter;
        self
    }

    /// Same record with id and audit timestamp cleared, for comparing content.
    pub fn content(&self) -> Self {
        Self {
            map_id: 0,
            last_modified: None,
            ..self.clone()
        }
    }

    /// Same record with every code equal to its catalog's absent sentinel
    /// replaced by `None`. Stores cannot tell the two apart.
    pub fn normalized_codes(&self) -> Self {
        let clear = |catalog: Catalog, code: Option<i32>| {
            code.filter(|c| *c != catalog.absent_color_code())
        };
        Self {
            primary: clear(Catalog::Primary, self.primary),
            marketplace: clear(Catalog::Marketplace, self.marketplace),
            open_format: clear(Catalog::OpenFormat, self.open_format),
            ..self.clone()
        }
    }
}

// ============================================================================
// PARTS
// ============================================================================

/// PartEquivalence - a part known in up to three catalogs, with per-direction
/// translation switches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PartEquivalence {
    pub map_id: MapId,
    /// Family id grouping related variants
    pub master_id: String,
    /// Primary catalog design id
    pub design_id: String,
    /// Decoration id; empty means "no decoration"
    pub decoration_id: String,
    pub name: String,
    pub marketplace_id: String,
    pub open_format_id: String,
    pub directions: DirectionSet,
    /// Set by the store on every write
    pub last_modified: Option<Timestamp>,
}

impl PartEquivalence {
    /// New unsaved mapping between the three catalog ids.
    pub fn new(
        design_id: impl Into<String>,
        marketplace_id: impl Into<String>,
        open_format_id: impl Into<String>,
    ) -> Self {
        Self {
            design_id: design_id.into(),
            marketplace_id: marketplace_id.into(),
            open_format_id: open_format_id.into(),
            ..Default::default()
        }
    }

    /// Id of this part in the given catalog.
    pub fn catalog_id(&self, catalog: Catalog) -> &str {
        match catalog {
            Catalog::Primary => &self.design_id,
            Catalog::Marketplace => &self.marketplace_id,
            Catalog::OpenFormat => &self.open_format_id,
        }
    }

    /// Lookup key for `direction`.
    pub fn source_id(&self, direction: Direction) -> &str {
        self.catalog_id(direction.source())
    }

    /// Translation result for `direction`.
    pub fn target_id(&self, direction: Direction) -> &str {
        self.catalog_id(direction.target())
    }

    /// Whether this record translates along `direction`.
    pub fn enables(&self, direction: Direction) -> bool {
        self.directions.enables(direction)
    }

    /// Whether any direction is enabled.
    pub fn is_rule(&self) -> bool {
        !self.directions.is_empty()
    }

    pub fn with_id(mut self, map_id: MapId) -> Self {
        self.map_id = map_id;
        self
    }

    pub fn with_master(mut self, master_id: impl Into<String>) -> Self {
        self.master_id = master_id.into();
        self
    }

    pub fn with_decoration(mut self, decoration_id: impl Into<String>) -> Self {
        self.decoration_id = decoration_id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_directions(mut self, directions: impl Into<DirectionSet>) -> Self {
        self.directions = directions.into();
        self
    }

    /// Same record with every text field trimmed.
    pub fn trimmed(&self) -> Self {
        Self {
            master_id: self.master_id.trim().to_string(),
            design_id: self.design_id.trim().to_string(),
            decoration_id: self.decoration_id.trim().to_string(),
            name: self.name.trim().to_string(),
            marketplace_id: self.marketplace_id.trim().to_string(),
            open_format_id: self.open_format_id.trim().to_string(),
            ..self.clone()
        }
    }

    /// Same record with id and audit timestamp cleared, for comparing content.
    pub fn content(&self) -> Self {
        Self {
            map_id: 0,
            last_modified: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for PartEquivalence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}|{}|{} - {}",
            self.map_id, self.design_id, self.marketplace_id, self.open_format_id, self.name
        )
    }
}
