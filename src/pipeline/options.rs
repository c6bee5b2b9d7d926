//! Per-run options and feature flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::ReferenceLocation;
use crate::routing::RateLimiter;

/// Knobs for one batch run. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Candidates routed per facility kind after the great-circle prefilter
    pub top_n: usize,
    /// Pause after every N provider calls; 0 disables pacing
    pub pause_every: u32,
    pub pause_secs: f64,

    pub include_reference: bool,
    pub reference: ReferenceLocation,

    pub include_highway: bool,
    pub include_city: bool,
    pub include_catchment: bool,
    pub catchment_radius_km: f64,
    pub stats_year: i32,

    pub enrich_nuts: bool,
    /// Fall back to reverse geocoding when no national admin dataset matches
    pub enrich_osm_admin: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            top_n: 3,
            pause_every: 0,
            pause_secs: 0.0,
            include_reference: true,
            reference: ReferenceLocation::default(),
            include_highway: true,
            include_city: true,
            include_catchment: true,
            catchment_radius_km: 50.0,
            stats_year: 2023,
            enrich_nuts: true,
            enrich_osm_admin: true,
        }
    }
}

impl RunOptions {
    /// Fresh pacing state for a run. The pause must be a finite, non-negative duration.
    pub fn rate_limiter(&self) -> Result<RateLimiter, ValidationError> {
        let pause = Duration::try_from_secs_f64(self.pause_secs).map_err(|_| {
            ValidationError::Invalid(format!(
                "pause_secs must be a non-negative number of seconds (got {})",
                self.pause_secs
            ))
        })?;
        Ok(RateLimiter::new(self.pause_every, pause))
    }

    /// Radius as it appears in column headers, e.g. "50"
    pub fn radius_label(&self) -> String {
        format!("{}", self.catchment_radius_km.trunc() as i64)
    }
}
