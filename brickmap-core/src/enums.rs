//! Catalog and translation-direction enums

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// TABLES
// ============================================================================

/// Tables managed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Colors,
    PartMapping,
}

impl Table {
    /// SQL table name.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Colors => "colors",
            Table::PartMapping => "partmapping",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// CATALOGS
// ============================================================================

/// One of the three independent catalogs a mapping bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Catalog {
    /// Vendor CAD catalog (LDD design ids, LDD color codes)
    Primary,
    /// Commercial marketplace catalog (BrickLink)
    Marketplace,
    /// Open file-format catalog (LDraw)
    OpenFormat,
}

impl Catalog {
    /// All catalogs, in column order.
    pub const ALL: [Catalog; 3] = [Catalog::Primary, Catalog::Marketplace, Catalog::OpenFormat];

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Primary => "primary",
            Catalog::Marketplace => "marketplace",
            Catalog::OpenFormat => "open_format",
        }
    }

    /// Integer stored for "no color code" in this catalog.
    ///
    /// The open format uses 0 as a real color (black), so its sentinel is -1.
    pub fn absent_color_code(&self) -> i32 {
        match self {
            Catalog::Primary | Catalog::Marketplace => 0,
            Catalog::OpenFormat => -1,
        }
    }

    /// Encode an optional color code into the sentinel form.
    pub fn encode_color_code(&self, code: Option<i32>) -> i32 {
        code.unwrap_or_else(|| self.absent_color_code())
    }

    /// Decode a stored color code, mapping the sentinel to `None`.
    pub fn decode_color_code(&self, raw: i32) -> Option<i32> {
        if raw == self.absent_color_code() {
            None
        } else {
            Some(raw)
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Catalog {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "ldd" => Ok(Catalog::Primary),
            "marketplace" | "bl" | "bricklink" => Ok(Catalog::Marketplace),
            "open_format" | "openformat" | "ldraw" => Ok(Catalog::OpenFormat),
            _ => Err(format!("unknown catalog: {}", s)),
        }
    }
}

// ============================================================================
// DIRECTIONS
// ============================================================================

/// An ordered catalog pair a part mapping may translate along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    PrimaryToMarketplace,
    MarketplaceToPrimary,
    PrimaryToOpenFormat,
    OpenFormatToPrimary,
    MarketplaceToOpenFormat,
    OpenFormatToMarketplace,
}

impl Direction {
    /// All six directions, in snapshot attribute order.
    pub const ALL: [Direction; 6] = [
        Direction::PrimaryToMarketplace,
        Direction::MarketplaceToPrimary,
        Direction::PrimaryToOpenFormat,
        Direction::OpenFormatToPrimary,
        Direction::MarketplaceToOpenFormat,
        Direction::OpenFormatToMarketplace,
    ];

    /// Catalog the lookup key comes from.
    pub fn source(&self) -> Catalog {
        match self {
            Direction::PrimaryToMarketplace | Direction::PrimaryToOpenFormat => Catalog::Primary,
            Direction::MarketplaceToPrimary | Direction::MarketplaceToOpenFormat => {
                Catalog::Marketplace
            }
            Direction::OpenFormatToPrimary | Direction::OpenFormatToMarketplace => {
                Catalog::OpenFormat
            }
        }
    }

    /// Catalog the translation produces.
    pub fn target(&self) -> Catalog {
        match self {
            Direction::MarketplaceToPrimary | Direction::OpenFormatToPrimary => Catalog::Primary,
            Direction::PrimaryToMarketplace | Direction::OpenFormatToMarketplace => {
                Catalog::Marketplace
            }
            Direction::PrimaryToOpenFormat | Direction::MarketplaceToOpenFormat => {
                Catalog::OpenFormat
            }
        }
    }

    /// The reverse direction.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::PrimaryToMarketplace => Direction::MarketplaceToPrimary,
            Direction::MarketplaceToPrimary => Direction::PrimaryToMarketplace,
            Direction::PrimaryToOpenFormat => Direction::OpenFormatToPrimary,
            Direction::OpenFormatToPrimary => Direction::PrimaryToOpenFormat,
            Direction::MarketplaceToOpenFormat => Direction::OpenFormatToMarketplace,
            Direction::OpenFormatToMarketplace => Direction::MarketplaceToOpenFormat,
        }
    }

    /// Flag bit for this direction.
    pub fn flag(&self) -> DirectionSet {
        match self {
            Direction::PrimaryToMarketplace => DirectionSet::PRIMARY_TO_MARKETPLACE,
            Direction::MarketplaceToPrimary => DirectionSet::MARKETPLACE_TO_PRIMARY,
            Direction::PrimaryToOpenFormat => DirectionSet::PRIMARY_TO_OPEN_FORMAT,
            Direction::OpenFormatToPrimary => DirectionSet::OPEN_FORMAT_TO_PRIMARY,
            Direction::MarketplaceToOpenFormat => DirectionSet::MARKETPLACE_TO_OPEN_FORMAT,
            Direction::OpenFormatToMarketplace => DirectionSet::OPEN_FORMAT_TO_MARKETPLACE,
        }
    }

    /// Column / snapshot attribute carrying this flag.
    pub fn column(&self) -> &'static str {
        match self {
            Direction::PrimaryToMarketplace => "ldd2bl",
            Direction::MarketplaceToPrimary => "bl2ldd",
            Direction::PrimaryToOpenFormat => "ldd2dat",
            Direction::OpenFormatToPrimary => "dat2ldd",
            Direction::MarketplaceToOpenFormat => "bl2dat",
            Direction::OpenFormatToMarketplace => "dat2bl",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source(), self.target())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(direction) = Direction::ALL.iter().find(|d| d.column() == s) {
            return Ok(*direction);
        }
        let (from, to) = s
            .split_once("->")
            .ok_or_else(|| format!("unknown direction: {}", s))?;
        let from: Catalog = from.trim().parse()?;
        let to: Catalog = to.trim().parse()?;
        Direction::ALL
            .iter()
            .find(|d| d.source() == from && d.target() == to)
            .copied()
            .ok_or_else(|| format!("unknown direction: {}", s))
    }
}

bitflags! {
    /// Set of enabled translation directions on a part mapping.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct DirectionSet: u8 {
        const PRIMARY_TO_MARKETPLACE = 1 << 0;
        const MARKETPLACE_TO_PRIMARY = 1 << 1;
        const PRIMARY_TO_OPEN_FORMAT = 1 << 2;
        const OPEN_FORMAT_TO_PRIMARY = 1 << 3;
        const MARKETPLACE_TO_OPEN_FORMAT = 1 << 4;
        const OPEN_FORMAT_TO_MARKETPLACE = 1 << 5;
    }
}

impl DirectionSet {
    /// Whether `direction` is enabled.
    pub fn enables(&self, direction: Direction) -> bool {
        self.contains(direction.flag())
    }

    /// Enabled directions, in [`Direction::ALL`] order.
    pub fn directions(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(move |d| self.enables(*d))
    }
}

impl From<Direction> for DirectionSet {
    fn from(direction: Direction) -> Self {
        direction.flag()
    }
}

impl FromIterator<Direction> for DirectionSet {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        iter.into_iter()
            .fold(DirectionSet::empty(), |set, d| set | d.flag())
    }
}
