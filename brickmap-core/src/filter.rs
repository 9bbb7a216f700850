//! Structured filters for listing and searching mappings
//!
//! Filters are plain predicates over records. Every set field must match;
//! unset fields match anything.

use crate::{Catalog, ColorEquivalence, DirectionSet, PartEquivalence, Timestamp};
use serde::{Deserialize, Serialize};

/// Structured filter over part mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartFilter {
    /// Directions that must all be enabled
    pub directions: DirectionSet,
    /// Exact master id
    pub master_id: Option<String>,
    /// Exact design id
    pub design_id: Option<String>,
    /// Exact decoration id (`Some("")` selects undecorated parts)
    pub decoration_id: Option<String>,
    /// Exact marketplace id
    pub marketplace_id: Option<String>,
    /// Exact open-format id
    pub open_format_id: Option<String>,
    /// Only records modified at or after this instant
    pub modified_since: Option<Timestamp>,
    /// Only records with at least one direction enabled
    pub rules_only: bool,
}

impl PartFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every direction in `directions`.
    pub fn with_directions(mut self, directions: impl Into<DirectionSet>) -> Self {
        self.directions |= directions.into();
        self
    }

    pub fn with_master(mut self, master_id: impl Into<String>) -> Self {
        self.master_id = Some(master_id.into());
        self
    }

    pub fn with_decoration(mut self, decoration_id: impl Into<String>) -> Self {
        self.decoration_id = Some(decoration_id.into());
        self
    }

    /// Require an exact id in `catalog`.
    pub fn with_catalog_id(mut self, catalog: Catalog, id: impl Into<String>) -> Self {
        let id = Some(id.into());
        match catalog {
            Catalog::Primary => self.design_id = id,
            Catalog::Marketplace => self.marketplace_id = id,
            Catalog::OpenFormat => self.open_format_id = id,
        }
        self
    }

    pub fn modified_since(mut self, since: Timestamp) -> Self {
        self.modified_since = Some(since);
        self
    }

    pub fn rules_only(mut self) -> Self {
        self.rules_only = true;
        self
    }

    pub fn matches(&self, part: &PartEquivalence) -> bool {
        fn field_matches(wanted: &Option<String>, actual: &str) -> bool {
            wanted.as_deref().map_or(true, |w| w == actual)
        }

        part.directions.contains(self.directions)
            && (!self.rules_only || part.is_rule())
            && field_matches(&self.master_id, &part.master_id)
            && field_matches(&self.design_id, &part.design_id)
            && field_matches(&self.decoration_id, &part.decoration_id)
            && field_matches(&self.marketplace_id, &part.marketplace_id)
            && field_matches(&self.open_format_id, &part.open_format_id)
            && self
                .modified_since
                .map_or(true, |since| part.last_modified.is_some_and(|m| m >= since))
    }
}

/// Structured filter over colors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorFilter {
    pub in_production: Option<bool>,
    pub metallic: Option<bool>,
    pub transparent: Option<bool>,
    pub glitter: Option<bool>,
    pub group: Option<i32>,
    /// Case-insensitive substring of the display name
    pub name_contains: Option<String>,
    /// Only colors that have a code in this catalog
    pub has_code_in: Option<Catalog>,
}

impl ColorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_production(mut self, value: bool) -> Self {
        self.in_production = Some(value);
        self
    }

    pub fn transparent(mut self, value: bool) -> Self {
        self.transparent = Some(value);
        self
    }

    pub fn in_group(mut self, group: i32) -> Self {
        self.group = Some(group);
        self
    }

    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn has_code_in(mut self, catalog: Catalog) -> Self {
        self.has_code_in = Some(catalog);
        self
    }

    pub fn matches(&self, color: &ColorEquivalence) -> bool {
        fn flag_matches(wanted: Option<bool>, actual: bool) -> bool {
            wanted.map_or(true, |w| w == actual)
        }

        flag_matches(self.in_production, color.in_production)
            && flag_matches(self.metallic, color.metallic)
            && flag_matches(self.transparent, color.transparent)
            && flag_matches(self.glitter, color.glitter)
            && self.group.map_or(true, |g| g == color.group)
            && self.name_contains.as_deref().map_or(true, |fragment| {
                color.name.to_lowercase().contains(&fragment.to_lowercase())
            })
            && self
                .has_code_in
                .map_or(true, |catalog| color.code(catalog).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_empty_part_filter_matches_everything() {
        let part = PartEquivalence::new("3001", "", "");
        assert!(PartFilter::new().matches(&part));
    }

    #[test]
    fn test_part_filter_requires_all_directions() {
        let part = PartEquivalence::new("3001", "3001", "3001.dat")
            .with_directions(DirectionSet::PRIMARY_TO_MARKETPLACE | DirectionSet::PRIMARY_TO_OPEN_FORMAT);
        let both = PartFilter::new()
            .with_directions(Direction::PrimaryToMarketplace)
            .with_directions(Direction::PrimaryToOpenFormat);
        assert!(both.matches(&part));
        let reverse = PartFilter::new().with_directions(Direction::MarketplaceToPrimary);
        assert!(!reverse.matches(&part));
    }

    #[test]
    fn test_part_filter_undecorated() {
        let plain = PartEquivalence::new("3001", "3001", "");
        let printed = PartEquivalence::new("3001", "3001pb01", "").with_decoration("4113");
        let filter = PartFilter::new().with_decoration("");
        assert!(filter.matches(&plain));
        assert!(!filter.matches(&printed));
    }

    #[test]
    fn test_part_filter_modified_since() {
        let at = Utc.with_ymd_and_hms(2017, 1, 1, 0, 0, 0).unwrap();
        let mut part = PartEquivalence::new("3001", "", "");
        let filter = PartFilter::new().modified_since(at);
        assert!(!filter.matches(&part));
        part.last_modified = Some(at);
        assert!(filter.matches(&part));
    }

    #[test]
    fn test_part_filter_catalog_id_and_rules_only() {
        let part = PartEquivalence::new("3001", "3001", "3001.dat");
        let filter = PartFilter::new().with_catalog_id(Catalog::OpenFormat, "3001.dat");
        assert!(filter.matches(&part));
        assert!(!filter.clone().rules_only().matches(&part));
    }

    #[test]
    fn test_color_filter() {
        let color = ColorEquivalence::new(Some(41), Some(17), None)
            .with_name("Tr. Red")
            .with_flags(true, false, true, false)
            .with_group(3);
        assert!(ColorFilter::new().transparent(true).in_group(3).matches(&color));
        assert!(ColorFilter::new().name_contains("tr. r").matches(&color));
        assert!(!ColorFilter::new().has_code_in(Catalog::OpenFormat).matches(&color));
        assert!(!ColorFilter::new().in_production(false).matches(&color));
    }
}
