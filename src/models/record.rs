//! Per-site result records and processing logs.

use serde::{Deserialize, Serialize};

use super::{CatchmentResult, RegionEntry};

/// Outcome of one enrichment field.
///
/// Keeps "nothing there" apart from "could not find out"; both render as
/// the missing marker in tabular output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    /// Step did not run (feature disabled or site aborted first)
    Pending,
    Found(T),
    /// Lookup succeeded but nothing matched
    NotFound,
    /// Lookup failed; the reason is also in the site log
    Failed(String),
}

impl<T> Lookup<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Lookup::NotFound, Lookup::Found)
    }
}

impl<T> Default for Lookup<T> {
    fn default() -> Self {
        Lookup::Pending
    }
}

/// Nearest facility with its routed distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedFacility {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Routed distance and time to a fixed point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_km: f64,
    pub duration_min: f64,
}

/// Nearest highway access point.
///
/// `duration_min` is absent when routing failed and `distance_km` is the
/// straight-line distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighwayLeg {
    pub name: String,
    pub distance_km: f64,
    pub duration_min: Option<f64>,
}

/// Nearest major city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityLeg {
    pub name: String,
    pub population: Option<u64>,
    /// None when the route to the city failed
    pub route: Option<RouteLeg>,
}

/// Enrichment step, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Regions,
    Airport,
    Seaport,
    Highway,
    Reference,
    City,
    Catchment,
}

impl Step {
    /// All steps in the order they run for every site
    pub fn all() -> &'static [Step] {
        &[
            Step::Regions,
            Step::Airport,
            Step::Seaport,
            Step::Highway,
            Step::Reference,
            Step::City,
            Step::Catchment,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Step::Regions => "Regions",
            Step::Airport => "Airport",
            Step::Seaport => "Seaport",
            Step::Highway => "Highway",
            Step::Reference => "Reference",
            Step::City => "Nearest City",
            Step::Catchment => "Catchment",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of a site's processing log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    Info { message: String },
    /// Step failed; processing continued with the next step
    Error { step: Step, message: String },
    /// Step failed and the remaining steps for the site were skipped
    Abort { step: Step, message: String },
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        !matches!(self, LogEntry::Info { .. })
    }
}

/// Ordered log of one site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteLog {
    pub site: String,
    pub entries: Vec<LogEntry>,
}

impl SiteLog {
    pub fn new(site: &str) -> Self {
        Self {
            site: site.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry::Info {
            message: message.into(),
        });
    }

    pub fn error(&mut self, step: Step, message: impl Into<String>) {
        self.entries.push(LogEntry::Error {
            step,
            message: message.into(),
        });
    }

    pub fn abort(&mut self, step: Step, message: impl Into<String>) {
        self.entries.push(LogEntry::Abort {
            step,
            message: message.into(),
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.is_error())
    }
}

/// Result record for one site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub project_id: String,
    pub site_id: String,
    pub site_name: String,
    pub latitude: f64,
    pub longitude: f64,

    pub airport: Lookup<RoutedFacility>,
    pub seaport: Lookup<RoutedFacility>,
    pub highway: Lookup<HighwayLeg>,
    pub reference: Lookup<RouteLeg>,
    pub city: Lookup<CityLeg>,

    pub municipality: Lookup<RegionEntry>,
    pub county: Lookup<RegionEntry>,
    pub region: Lookup<RegionEntry>,
    pub nuts2: Lookup<RegionEntry>,
    pub nuts3: Lookup<RegionEntry>,

    pub catchment: Lookup<CatchmentResult>,
}

impl SiteRecord {
    pub fn new(project_id: &str, site_id: &str, site_name: &str, lat: f64, lon: f64) -> Self {
        Self {
            project_id: project_id.to_string(),
            site_id: site_id.to_string(),
            site_name: site_name.to_string(),
            latitude: crate::geodesy::round_to(lat, 6),
            longitude: crate::geodesy::round_to(lon, 6),
            airport: Lookup::Pending,
            seaport: Lookup::Pending,
            highway: Lookup::Pending,
            reference: Lookup::Pending,
            city: Lookup::Pending,
            municipality: Lookup::Pending,
            county: Lookup::Pending,
            region: Lookup::Pending,
            nuts2: Lookup::Pending,
            nuts3: Lookup::Pending,
            catchment: Lookup::Pending,
        }
    }
}
