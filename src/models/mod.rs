//! Core data models for site evaluation.

pub mod catchment;
pub mod record;
pub mod region;
pub mod site;

pub use catchment::{CatchmentResult, MAX_LISTED_REGIONS};
pub use record::{
    CityLeg, HighwayLeg, LogEntry, Lookup, RouteLeg, RoutedFacility, SiteLog, SiteRecord, Step,
};
pub use region::{RegionArea, RegionEntry, RegionLevel};
pub use site::{Facility, FacilityKind, ReferenceLocation, Site};
