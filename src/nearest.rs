//! Two-stage nearest facility search.
//!
//! Candidates are ranked by great-circle distance; only the top K are routed,
//! and the shortest routed distance wins.

use serde::Serialize;
use tracing::{debug, warn};

use crate::geodesy::Coordinate;
use crate::models::{Facility, RoutedFacility};
use crate::routing::{Router, RoutingError};

/// Anything with a position
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

impl Located for Facility {
    fn coordinate(&self) -> Coordinate {
        Facility::coordinate(self)
    }
}

/// Rank candidates by great-circle distance and keep the first `k`.
///
/// The sort is stable, so equidistant candidates keep their input order.
pub fn prefilter<T: Located>(origin: Coordinate, candidates: &[T], k: usize) -> Vec<(&T, f64)> {
    let mut ranked: Vec<(&T, f64)> = candidates
        .iter()
        .map(|c| (c, origin.haversine_km(&c.coordinate())))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));
    ranked.truncate(k);
    ranked
}

/// A candidate whose routing call failed
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub name: String,
    pub error: String,
    #[serde(skip)]
    pub fatal: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub best: Option<RoutedFacility>,
    pub failures: Vec<CandidateFailure>,
    /// Set when routing stopped early on quota exhaustion
    pub aborted: Option<RoutingError>,
}

/// Finds the facility with the shortest routed distance among the K nearest
pub struct NearestNeighborResolver {
    top_n: usize,
}

impl NearestNeighborResolver {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub async fn resolve(
        &self,
        router: &mut Router,
        origin: Coordinate,
        candidates: &[Facility],
    ) -> Resolution {
        let mut resolution = Resolution::default();
        let shortlist = prefilter(origin, candidates, self.top_n);
        debug!(
            "Routing {} of {} candidates from {}",
            shortlist.len(),
            candidates.len(),
            origin
        );

        for (facility, approx_km) in shortlist {
            match router.route(origin, facility.coordinate()).await {
                Ok(leg) => {
                    let better = resolution
                        .best
                        .as_ref()
                        .map_or(true, |b| leg.distance_km < b.distance_km);
                    if better {
                        resolution.best = Some(RoutedFacility {
                            name: facility.name.clone(),
                            code: facility.code.clone(),
                            distance_km: leg.distance_km,
                            duration_min: leg.duration_min,
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        "Routing to {} ({:.1} km away) failed: {}",
                        facility.name, approx_km, e
                    );
                    let fatal = e.is_fatal();
                    resolution.failures.push(CandidateFailure {
                        name: facility.name.clone(),
                        error: e.to_string(),
                        fatal,
                    });
                    if fatal {
                        resolution.aborted = Some(e);
                        break;
                    }
                }
            }
        }

        resolution
    }
}
