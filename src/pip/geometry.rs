//! Geometry conversion and repair for region polygons.

use geo::{
    Area, BooleanOps, Buffer, Coord, Geometry, LineString, MultiPolygon, Polygon,
    RemoveRepeatedPoints, Validation,
};
use tracing::debug;

use crate::error::GeometryError;

/// Convert any areal geometry to a MultiPolygon
pub fn to_multipolygon(geometry: Geometry<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    match geometry {
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::Rect(r) => Ok(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc {
                if let Ok(mp) = to_multipolygon(g) {
                    polygons.extend(mp.0);
                }
            }
            if polygons.is_empty() {
                Err(GeometryError::Unsupported("GeometryCollection".to_string()))
            } else {
                Ok(MultiPolygon::new(polygons))
            }
        }
        other => Err(GeometryError::Unsupported(geometry_type_name(&other).to_string())),
    }
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Close a ring if needed. Returns None for rings with fewer than 4 coordinates.
pub fn close_ring(mut coords: Vec<Coord<f64>>) -> Option<LineString<f64>> {
    if coords.len() < 3 {
        return None;
    }
    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    if coords.len() < 4 {
        return None;
    }
    Some(LineString::new(coords))
}

/// Close rings, drop repeated points, drop degenerate rings and polygons
fn normalize(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let polygons = mp
        .iter()
        .filter_map(|polygon| {
            let polygon = polygon.remove_repeated_points();
            let exterior = close_ring(polygon.exterior().0.clone())?;
            let interiors = polygon
                .interiors()
                .iter()
                .filter_map(|ring| close_ring(ring.0.clone()))
                .collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();
    MultiPolygon::new(polygons)
}

fn is_empty(mp: &MultiPolygon<f64>) -> bool {
    mp.0.is_empty() || mp.unsigned_area() == 0.0
}

/// Repair a polygon so containment tests are meaningful.
///
/// Valid input is returned after ring normalization. Invalid input (e.g.
/// self-intersections) is rebuilt through an overlay union; if that does not
/// produce a valid non-empty geometry a zero-width buffer is tried.
pub fn repair(mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let normalized = normalize(mp);
    if is_empty(&normalized) {
        return Err(GeometryError::Empty);
    }

    if normalized.is_valid() {
        return Ok(normalized);
    }

    let unioned = normalized.union(&MultiPolygon::new(vec![]));
    if !is_empty(&unioned) && unioned.is_valid() {
        debug!("Repaired invalid geometry via overlay union");
        return Ok(unioned);
    }

    let buffered = normalized.buffer(0.0);
    if !is_empty(&buffered) {
        debug!("Repaired invalid geometry via zero-width buffer");
        return Ok(buffered);
    }

    Err(GeometryError::Unrepairable)
}
