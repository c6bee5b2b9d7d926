//! Input records: candidate sites and transport facilities.

use serde::{Deserialize, Serialize};

use crate::geodesy::Coordinate;

/// A candidate site to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub site_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Site {
    pub fn new(project_id: &str, site_id: &str, name: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            project_id: project_id.to_string(),
            site_id: site_id.to_string(),
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Kind of transport facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacilityKind {
    Airport,
    Seaport,
}

impl FacilityKind {
    /// Name of the column holding the facility name in input files
    pub fn name_column(&self) -> &'static str {
        match self {
            FacilityKind::Airport => "Airport Name",
            FacilityKind::Seaport => "Seaport Name",
        }
    }

    /// Columns consulted for the facility code, first non-empty wins
    pub fn code_columns(&self) -> &'static [&'static str] {
        match self {
            FacilityKind::Airport => &["IATA", "ICAO"],
            FacilityKind::Seaport => &["UNLOCODE"],
        }
    }

    /// Label used in log messages
    pub fn label(&self) -> &'static str {
        match self {
            FacilityKind::Airport => "Airport",
            FacilityKind::Seaport => "Seaport",
        }
    }
}

impl std::fmt::Display for FacilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An airport or seaport candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Facility {
    pub fn new(name: &str, code: Option<&str>, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.to_string(),
            code: code.filter(|c| !c.is_empty()).map(String::from),
            latitude,
            longitude,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A named point the sites are measured against (e.g. a headquarters).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ReferenceLocation {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl Default for ReferenceLocation {
    fn default() -> Self {
        Self {
            name: "Bedburg, Germany".to_string(),
            latitude: 51.0126,
            longitude: 6.5741,
        }
    }
}
