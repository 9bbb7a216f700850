//! Attribute encoding of snapshot records.

use brickmap_core::{
    format_timestamp, parse_timestamp, Catalog, ColorEquivalence, Direction, DirectionSet,
    FormatError, PartEquivalence, Rgba, Timestamp,
};
use std::collections::BTreeMap;

/// A record that can be exchanged as one empty XML element.
pub trait SnapshotRecord: Sized {
    /// Root element wrapping all records.
    const ROOT: &'static str;
    /// Element carrying one record.
    const ELEMENT: &'static str;

    /// Attributes in document order.
    fn to_attributes(&self) -> Vec<(&'static str, String)>;

    /// Decode a record, failing on the first bad attribute.
    fn from_attributes(attrs: &Attributes) -> Result<Self, FormatError>;
}

/// Decoded attributes of one record element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    element: &'static str,
    values: BTreeMap<String, String>,
}

impl Attributes {
    pub fn new(element: &'static str) -> Self {
        Self {
            element,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Raw attribute text.
    pub fn text(&self, name: &'static str) -> Result<&str, FormatError> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or(FormatError::MissingAttribute {
                element: self.element,
                attribute: name,
            })
    }

    fn number(&self, name: &'static str) -> Result<i64, FormatError> {
        let raw = self.text(name)?;
        raw.trim().parse::<i64>().map_err(|_| FormatError::InvalidNumber {
            element: self.element,
            attribute: name,
            value: raw.to_string(),
        })
    }

    /// Attribute as an `i32`.
    pub fn int(&self, name: &'static str) -> Result<i32, FormatError> {
        let value = self.number(name)?;
        i32::try_from(value).map_err(|_| FormatError::OutOfRange {
            element: self.element,
            attribute: name,
            value,
        })
    }

    /// Attribute as a color channel in 0..=255.
    pub fn channel(&self, name: &'static str) -> Result<u8, FormatError> {
        let value = self.number(name)?;
        u8::try_from(value).map_err(|_| FormatError::OutOfRange {
            element: self.element,
            attribute: name,
            value,
        })
    }

    /// `"1"` is true, anything else false.
    pub fn flag(&self, name: &'static str) -> Result<bool, FormatError> {
        Ok(self.text(name)? == "1")
    }

    /// Empty text decodes to `None`.
    pub fn timestamp(&self, name: &'static str) -> Result<Option<Timestamp>, FormatError> {
        let raw = self.text(name)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| FormatError::InvalidTimestamp {
                element: self.element,
                value: raw.to_string(),
            })
    }
}

fn flag_text(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn timestamp_text(value: &Option<Timestamp>) -> String {
    value.as_ref().map(format_timestamp).unwrap_or_default()
}

// ============================================================================
// COLORS
// ============================================================================

impl SnapshotRecord for ColorEquivalence {
    const ROOT: &'static str = "colormaps";
    const ELEMENT: &'static str = "colormap";

    fn to_attributes(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", self.map_id.to_string()),
            ("ldd", Catalog::Primary.encode_color_code(self.primary).to_string()),
            ("bl", Catalog::Marketplace.encode_color_code(self.marketplace).to_string()),
            ("ldraw", Catalog::OpenFormat.encode_color_code(self.open_format).to_string()),
            ("r", self.color.r.to_string()),
            ("g", self.color.g.to_string()),
            ("b", self.color.b.to_string()),
            ("a", self.color.a.to_string()),
            ("inuse", flag_text(self.in_production)),
            ("metallic", flag_text(self.metallic)),
            ("transparent", flag_text(self.transparent)),
            ("glitter", flag_text(self.glitter)),
            ("lddname", self.name.clone()),
            ("group", self.group.to_string()),
            ("notes", self.notes.clone()),
            ("lastmod", timestamp_text(&self.last_modified)),
        ]
    }

    fn from_attributes(attrs: &Attributes) -> Result<Self, FormatError> {
        Ok(ColorEquivalence {
            map_id: attrs.int("id")?,
            primary: Catalog::Primary.decode_color_code(attrs.int("ldd")?),
            marketplace: Catalog::Marketplace.decode_color_code(attrs.int("bl")?),
            open_format: Catalog::OpenFormat.decode_color_code(attrs.int("ldraw")?),
            color: Rgba::new(
                attrs.channel("r")?,
                attrs.channel("g")?,
                attrs.channel("b")?,
                attrs.channel("a")?,
            ),
            in_production: attrs.flag("inuse")?,
            metallic: attrs.flag("metallic")?,
            transparent: attrs.flag("transparent")?,
            glitter: attrs.flag("glitter")?,
            name: attrs.text("lddname")?.to_string(),
            group: attrs.int("group")?,
            notes: attrs.text("notes")?.to_string(),
            last_modified: attrs.timestamp("lastmod")?,
        })
    }
}

// ============================================================================
// PARTS
// ============================================================================

impl SnapshotRecord for PartEquivalence {
    const ROOT: &'static str = "partmaps";
    const ELEMENT: &'static str = "partmap";

    fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = vec![
            ("id", self.map_id.to_string()),
            ("masterid", self.master_id.clone()),
            ("designid", self.design_id.clone()),
            ("decorid", self.decoration_id.clone()),
            ("name", self.name.clone()),
            ("blid", self.marketplace_id.clone()),
            ("ldrawid", self.open_format_id.clone()),
        ];
        for direction in Direction::ALL {
            attrs.push((direction.column(), flag_text(self.enables(direction))));
        }
        attrs.push(("lastmod", timestamp_text(&self.last_modified)));
        attrs
    }

    fn from_attributes(attrs: &Attributes) -> Result<Self, FormatError> {
        let mut directions = DirectionSet::empty();
        for direction in Direction::ALL {
            if attrs.flag(direction.column())? {
                directions |= direction.flag();
            }
        }
        Ok(PartEquivalence {
            map_id: attrs.int("id")?,
            master_id: attrs.text("masterid")?.to_string(),
            design_id: attrs.text("designid")?.to_string(),
            decoration_id: attrs.text("decorid")?.to_string(),
            name: attrs.text("name")?.to_string(),
            marketplace_id: attrs.text("blid")?.to_string(),
            open_format_id: attrs.text("ldrawid")?.to_string(),
            directions,
            last_modified: attrs.timestamp("lastmod")?,
        })
    }
}
