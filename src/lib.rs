//! roadscout - batch site evaluation against transport and labor-market data
//!
//! For each candidate site: region codes, routed distance to the nearest
//! airport, seaport, highway access, reference location and major city, and
//! a distance-weighted catchment summary. Shared by the `evaluate` and
//! `serve` binaries.

pub mod catchment;
pub mod cities;
pub mod config;
pub mod discord;
pub mod error;
pub mod export;
pub mod geocode;
pub mod geodesy;
pub mod highway;
pub mod models;
pub mod nearest;
pub mod pip;
pub mod pipeline;
pub mod progress;
pub mod routing;

pub use config::Config;
pub use geodesy::Coordinate;
pub use models::{Facility, FacilityKind, Site, SiteLog, SiteRecord};
pub use pipeline::{BatchPipeline, ResultSchema, RunOptions, RunOutput};
