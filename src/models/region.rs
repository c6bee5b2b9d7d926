//! Administrative and statistical region types for PIP lookup.

use serde::{Deserialize, Serialize};

/// Region level tag.
///
/// National administrative levels come first (coarse to fine), followed by
/// the NUTS statistical levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// Region / state / voivodeship
    AdminRegion,
    /// County / district / powiat
    AdminCounty,
    /// Municipality / LAU / gmina
    AdminMunicipality,
    /// NUTS level 2
    Nuts2,
    /// NUTS level 3
    Nuts3,
}

impl RegionLevel {
    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            RegionLevel::AdminRegion => "region",
            RegionLevel::AdminCounty => "county",
            RegionLevel::AdminMunicipality => "municipality",
            RegionLevel::Nuts2 => "nuts2",
            RegionLevel::Nuts3 => "nuts3",
        }
    }
}

impl std::fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Metadata of one region polygon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionArea {
    /// Region code (NUTS_ID, TERYT, ...)
    pub code: String,

    /// Display name
    pub name: String,

    pub level: RegionLevel,

    /// ISO country code if the dataset carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl RegionArea {
    pub fn new(code: &str, name: &str, level: RegionLevel) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            level,
            country: None,
        }
    }
}

/// Code and name of a resolved region, as stored on a result record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RegionEntry {
    pub fn new(name: Option<String>, code: Option<String>) -> Self {
        Self {
            name: name.filter(|n| !n.is_empty()),
            code: code.filter(|c| !c.is_empty()),
        }
    }

    pub fn from_area(area: &RegionArea) -> Self {
        Self::new(Some(area.name.clone()), Some(area.code.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.code.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_drops_blank_parts() {
        let entry = RegionEntry::new(Some(String::new()), Some("DE111".to_string()));
        assert_eq!(entry.name, None);
        assert_eq!(entry.code.as_deref(), Some("DE111"));
        assert!(!entry.is_empty());
        assert!(RegionEntry::new(None, Some(String::new())).is_empty());
    }
}
