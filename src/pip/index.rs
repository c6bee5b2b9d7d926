//! Spatial index for fast region lookups.

use std::sync::Arc;

use geo::{Centroid, Contains, Intersects, Point, Rect};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use tracing::{info, warn};

use super::geometry::repair;
use super::RegionBoundary;

/// Half-width (degrees) of the box used when a point misses every envelope
pub const EDGE_EPSILON: f64 = 1e-4;

/// Wrapper for R-tree indexing of region boundaries
#[derive(Clone)]
pub struct IndexedRegion {
    /// Position in load order, used as the tie-break between overlapping polygons
    pub ordinal: usize,
    pub boundary: Arc<RegionBoundary>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedRegion {
    pub fn new(ordinal: usize, boundary: RegionBoundary) -> Option<Self> {
        let (min_x, min_y, max_x, max_y) = boundary.bbox()?;
        Some(Self {
            ordinal,
            boundary: Arc::new(boundary),
            envelope: AABB::from_corners([min_x, min_y], [max_x, max_y]),
        })
    }
}

/// Read-only point-in-polygon index over one boundary dataset
pub struct RegionIndex {
    tree: RTree<IndexedRegion>,
    /// Boundaries in load order, for the linear fallback and centroid scans
    ordered: Vec<Arc<RegionBoundary>>,
    centroids: Vec<Option<Point<f64>>>,
    dropped: usize,
}

impl RegionIndex {
    /// Build spatial index from region boundaries.
    ///
    /// Empty geometries are discarded and invalid ones repaired; boundaries
    /// that cannot be repaired are dropped.
    pub fn build(boundaries: Vec<RegionBoundary>) -> Self {
        let total = boundaries.len();
        info!("Building spatial index for {} regions...", total);

        let repaired: Vec<Option<RegionBoundary>> = boundaries
            .into_par_iter()
            .map(|boundary| match repair(&boundary.geometry) {
                Ok(geometry) => Some(RegionBoundary {
                    area: boundary.area,
                    geometry,
                }),
                Err(e) => {
                    warn!(
                        "Dropping region {} ({}): {}",
                        boundary.area.code, boundary.area.name, e
                    );
                    None
                }
            })
            .collect();

        let indexed: Vec<IndexedRegion> = repaired
            .into_iter()
            .flatten()
            .enumerate()
            .filter_map(|(ordinal, boundary)| IndexedRegion::new(ordinal, boundary))
            .collect();

        let ordered: Vec<Arc<RegionBoundary>> =
            indexed.iter().map(|ir| Arc::clone(&ir.boundary)).collect();
        let centroids = ordered.iter().map(|b| b.geometry.centroid()).collect();
        let dropped = total - ordered.len();

        let tree = RTree::bulk_load(indexed);
        info!(
            "Spatial index built with {} entries ({} dropped)",
            tree.size(),
            dropped
        );

        Self {
            tree,
            ordered,
            centroids,
            dropped,
        }
    }

    /// Envelope candidates sorted back into load order
    fn candidates(&self, envelope: &AABB<[f64; 2]>) -> Vec<&IndexedRegion> {
        let mut found: Vec<&IndexedRegion> =
            self.tree.locate_in_envelope_intersecting(envelope).collect();
        found.sort_by_key(|ir| ir.ordinal);
        found
    }

    /// Find the region containing a point.
    ///
    /// Interior containment wins over boundary contact; among equals the
    /// earliest loaded region wins. Points that miss every envelope are
    /// retried with an epsilon box, then with a full scan.
    pub fn lookup(&self, lat: f64, lon: f64) -> Option<Arc<RegionBoundary>> {
        let point = Point::new(lon, lat);
        let candidates = self.candidates(&AABB::from_point([lon, lat]));

        if !candidates.is_empty() {
            let hit = candidates
                .iter()
                .find(|ir| ir.boundary.geometry.contains(&point))
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|ir| ir.boundary.geometry.intersects(&point))
                });
            return hit.map(|ir| Arc::clone(&ir.boundary));
        }

        // Shared-edge float noise: test a small box around the point
        let nudge = Rect::new(
            (lon - EDGE_EPSILON, lat - EDGE_EPSILON),
            (lon + EDGE_EPSILON, lat + EDGE_EPSILON),
        );
        let envelope = AABB::from_corners(
            [lon - EDGE_EPSILON, lat - EDGE_EPSILON],
            [lon + EDGE_EPSILON, lat + EDGE_EPSILON],
        );
        let nudge = nudge.to_polygon();
        if let Some(ir) = self
            .candidates(&envelope)
            .into_iter()
            .find(|ir| ir.boundary.geometry.intersects(&nudge))
        {
            return Some(Arc::clone(&ir.boundary));
        }

        self.ordered
            .iter()
            .find(|b| b.geometry.contains(&point) || b.geometry.intersects(&point))
            .cloned()
    }

    /// Boundaries with their centroid (lat, lon), in load order
    pub fn centroids(&self) -> impl Iterator<Item = (&Arc<RegionBoundary>, Option<(f64, f64)>)> {
        self.ordered
            .iter()
            .zip(self.centroids.iter())
            .map(|(b, c)| (b, c.map(|p| (p.y(), p.x()))))
    }

    /// Get total number of indexed boundaries
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Number of input boundaries dropped at build time
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Iterate over all indexed boundaries in load order
    pub fn boundaries(&self) -> impl Iterator<Item = &Arc<RegionBoundary>> {
        self.ordered.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegionArea, RegionLevel};
    use geo::{polygon, MultiPolygon};

    fn boundary(code: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RegionBoundary {
        RegionBoundary {
            area: RegionArea::new(code, code, RegionLevel::Nuts3),
            geometry: MultiPolygon::new(vec![polygon![
                (x: x0, y: y0),
                (x: x1, y: y0),
                (x: x1, y: y1),
                (x: x0, y: y1),
                (x: x0, y: y0),
            ]]),
        }
    }

    /// Two regions sharing the edge lon = 10.0
    fn partition() -> RegionIndex {
        RegionIndex::build(vec![
            boundary("WEST", 9.0, 49.0, 10.0, 51.0),
            boundary("EAST", 10.0, 49.0, 11.0, 51.0),
        ])
    }

    #[test]
    fn test_empty_index() {
        let index = RegionIndex::build(vec![]);
        assert!(index.is_empty());
        assert!(index.lookup(50.0, 10.0).is_none());
    }

    #[test]
    fn test_interior_points() {
        let index = partition();
        assert_eq!(index.lookup(50.0, 9.5).unwrap().area.code, "WEST");
        assert_eq!(index.lookup(50.0, 10.5).unwrap().area.code, "EAST");
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let index = partition();
        let first = index.lookup(50.2, 10.7).unwrap().area.code.clone();
        for _ in 0..10 {
            assert_eq!(index.lookup(50.2, 10.7).unwrap().area.code, first);
        }
    }

    #[test]
    fn test_shared_edge_goes_to_first_loaded() {
        let index = partition();
        // On the shared edge neither contains the point; both touch it
        assert_eq!(index.lookup(50.0, 10.0).unwrap().area.code, "WEST");
    }

    #[test]
    fn test_containment_beats_touching() {
        // A touches the point on its edge, B contains it; A is loaded first
        let index = RegionIndex::build(vec![
            boundary("A", 9.0, 49.0, 10.0, 51.0),
            boundary("B", 9.5, 49.5, 10.5, 50.5),
        ]);
        assert_eq!(index.lookup(50.0, 10.0).unwrap().area.code, "B");
    }

    #[test]
    fn test_overlap_resolved_by_load_order() {
        let index = RegionIndex::build(vec![
            boundary("FIRST", 9.0, 49.0, 11.0, 51.0),
            boundary("SECOND", 9.5, 49.5, 10.5, 50.5),
        ]);
        assert_eq!(index.lookup(50.0, 10.0).unwrap().area.code, "FIRST");
    }

    #[test]
    fn test_epsilon_box_catches_near_miss() {
        let index = partition();
        // Just outside the western edge, within the epsilon box
        let hit = index.lookup(50.0, 9.0 - EDGE_EPSILON / 2.0).unwrap();
        assert_eq!(hit.area.code, "WEST");
        // Well outside
        assert!(index.lookup(50.0, 8.0).is_none());
    }

    #[test]
    fn test_degenerate_regions_dropped() {
        let mut sliver = boundary("SLIVER", 0.0, 0.0, 1.0, 0.0);
        sliver.geometry = MultiPolygon::new(vec![]);
        let index = RegionIndex::build(vec![sliver, boundary("OK", 0.0, 0.0, 1.0, 1.0)]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.dropped(), 1);
        assert_eq!(index.boundaries().next().unwrap().area.code, "OK");
    }

    #[test]
    fn test_centroids_in_load_order() {
        let index = partition();
        let centroids: Vec<_> = index.centroids().collect();
        assert_eq!(centroids[0].0.area.code, "WEST");
        let (lat, lon) = centroids[0].1.unwrap();
        assert!((lat - 50.0).abs() < 1e-9);
        assert!((lon - 9.5).abs() < 1e-9);
    }
}
