//! Labor-market catchment summary for one site.

use serde::{Deserialize, Serialize};

/// Number of contributing region ids kept on a result.
pub const MAX_LISTED_REGIONS: usize = 5;

/// Distance-weighted labor-market figures around a site.
///
/// All-zero figures mean "unavailable", not "nobody lives here".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchmentResult {
    pub radius_km: f64,
    pub total_population: i64,
    pub unemployed_persons: i64,
    pub active_population: i64,
    /// active - unemployed; may be negative on inconsistent inputs
    pub employed_persons: i64,
    /// Contributing region ids, truncated to [`MAX_LISTED_REGIONS`]
    pub regions: Vec<String>,
    /// Statistics year actually used
    pub data_year: i32,
}

impl CatchmentResult {
    /// The all-zero result reported when the catchment could not be computed
    pub fn unavailable(radius_km: f64, data_year: i32) -> Self {
        Self {
            radius_km,
            total_population: 0,
            unemployed_persons: 0,
            active_population: 0,
            employed_persons: 0,
            regions: Vec::new(),
            data_year,
        }
    }

    pub fn is_available(&self) -> bool {
        self.total_population > 0
    }
}
