//! Point-in-Polygon (PIP) region lookup.
//!
//! Loads administrative and NUTS boundaries from GeoJSON and provides fast
//! PIP lookups using an R-tree spatial index.

mod boundary;
pub mod geometry;
mod index;
mod service;

pub use boundary::{
    parse_boundaries, read_local, BoundaryProvider, BoundarySource, FieldMapping,
    GeoJsonBoundaryProvider, RegionBoundary,
};
pub use index::{IndexedRegion, RegionIndex, EDGE_EPSILON};
pub use service::{DatasetStatus, DatasetSummary, RegionCatalog};
