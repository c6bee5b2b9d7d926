//! Distance-weighted labor-market catchment around a site.
//!
//! NUTS3 regions whose centroid lies within the radius contribute with weight
//! `1 / (1 + d/10)`; each indicator is the weighted mean over those regions.

mod eurostat;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::geodesy::{haversine_km, Coordinate};
use crate::models::{CatchmentResult, MAX_LISTED_REGIONS};
use crate::pip::RegionIndex;

pub use eurostat::{
    decode_json_stat, EurostatClient, Indicator, StatisticsError, StatisticsProvider,
    DEFAULT_EUROSTAT_URL,
};

/// Share of the population assumed economically active when no figure exists
pub const ACTIVE_SHARE_FALLBACK: f64 = 0.65;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatchmentError {
    #[error("NUTS3 dataset unavailable")]
    DatasetUnavailable,

    #[error("no NUTS3 region near the site")]
    NoRegions,

    #[error("{indicator}: {source}")]
    Statistics {
        indicator: String,
        #[source]
        source: StatisticsError,
    },
}

/// A selected region and its centroid distance from the site
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRegion {
    pub code: String,
    pub distance_km: f64,
}

impl WeightedRegion {
    pub fn weight(&self) -> f64 {
        1.0 / (1.0 + self.distance_km / 10.0)
    }
}

/// Weighted means of the three indicators, unrounded
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeightedSummary {
    pub population: f64,
    pub unemployed: f64,
    pub active: f64,
}

/// Regions whose centroid lies within `radius_km`, in load order.
///
/// Falls back to the region containing the site (distance 0) when none
/// qualify.
pub fn select_regions(index: &RegionIndex, site: Coordinate, radius_km: f64) -> Vec<WeightedRegion> {
    let selected: Vec<WeightedRegion> = index
        .centroids()
        .filter(|(boundary, _)| !boundary.area.code.is_empty())
        .filter_map(|(boundary, centroid)| {
            let (lat, lon) = centroid?;
            let distance_km = haversine_km(site.lat, site.lon, lat, lon);
            (distance_km <= radius_km).then(|| WeightedRegion {
                code: boundary.area.code.clone(),
                distance_km,
            })
        })
        .collect();

    if !selected.is_empty() {
        return selected;
    }

    index
        .lookup(site.lat, site.lon)
        .filter(|b| !b.area.code.is_empty())
        .map(|b| {
            vec![WeightedRegion {
                code: b.area.code.clone(),
                distance_km: 0.0,
            }]
        })
        .unwrap_or_default()
}

/// Weighted mean of each indicator.
///
/// Missing values add nothing to the numerator but their weight still counts.
/// A missing active population is estimated from the population.
pub fn weighted_summary(
    regions: &[WeightedRegion],
    population: &HashMap<String, f64>,
    unemployed: &HashMap<String, f64>,
    active: &HashMap<String, f64>,
) -> WeightedSummary {
    let mut sum = WeightedSummary::default();
    let mut total_weight = 0.0;

    for region in regions {
        let w = region.weight();
        total_weight += w;

        let pop = population.get(&region.code).copied();
        sum.population += pop.unwrap_or(0.0) * w;
        sum.unemployed += unemployed.get(&region.code).copied().unwrap_or(0.0) * w;
        sum.active += match active.get(&region.code) {
            Some(a) => *a,
            None => pop.map_or(0.0, |p| p * ACTIVE_SHARE_FALLBACK),
        } * w;
    }

    if total_weight == 0.0 {
        return WeightedSummary::default();
    }
    WeightedSummary {
        population: sum.population / total_weight,
        unemployed: sum.unemployed / total_weight,
        active: sum.active / total_weight,
    }
}

/// Computes catchment summaries from a statistics provider
pub struct CatchmentAggregator {
    statistics: Arc<dyn StatisticsProvider>,
}

impl CatchmentAggregator {
    pub fn new(statistics: Arc<dyn StatisticsProvider>) -> Self {
        Self { statistics }
    }

    /// Fetch one indicator, retrying once with the previous year if empty
    async fn fetch_indicator(
        &self,
        indicator: Indicator,
        ids: &[String],
        year: i32,
    ) -> Result<(HashMap<String, f64>, Option<i32>), CatchmentError> {
        let to_error = |source| CatchmentError::Statistics {
            indicator: indicator.to_string(),
            source,
        };

        let first = self.statistics.fetch(indicator, ids, year).await;
        match first {
            Ok(values) if !values.is_empty() => return Ok((values, Some(year))),
            Ok(_) => debug!("No {} data for {}, trying {}", indicator, year, year - 1),
            Err(e) => warn!("{} for {} failed ({}), trying {}", indicator, year, e, year - 1),
        }

        let values = self
            .statistics
            .fetch(indicator, ids, year - 1)
            .await
            .map_err(to_error)?;
        let used = (!values.is_empty()).then_some(year - 1);
        Ok((values, used))
    }

    /// Catchment summary, or the reason it could not be computed
    pub async fn try_aggregate(
        &self,
        index: Option<&RegionIndex>,
        site: Coordinate,
        radius_km: f64,
        stats_year: i32,
    ) -> Result<CatchmentResult, CatchmentError> {
        let index = index.ok_or(CatchmentError::DatasetUnavailable)?;
        let regions = select_regions(index, site, radius_km);
        if regions.is_empty() {
            return Err(CatchmentError::NoRegions);
        }
        let ids: Vec<String> = regions.iter().map(|r| r.code.clone()).collect();
        debug!("Catchment at {}: {} regions within {} km", site, ids.len(), radius_km);

        let (population, pop_year) = self
            .fetch_indicator(Indicator::Population, &ids, stats_year)
            .await?;
        let (unemployed, unemp_year) = self
            .fetch_indicator(Indicator::Unemployed, &ids, stats_year)
            .await?;
        let (active, active_year) = self
            .fetch_indicator(Indicator::ActivePopulation, &ids, stats_year)
            .await?;

        let summary = weighted_summary(&regions, &population, &unemployed, &active);
        let data_year = [pop_year, unemp_year, active_year]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(stats_year);

        Ok(CatchmentResult {
            radius_km,
            total_population: summary.population.round() as i64,
            unemployed_persons: summary.unemployed.round() as i64,
            active_population: summary.active.round() as i64,
            employed_persons: (summary.active - summary.unemployed).round() as i64,
            regions: ids.into_iter().take(MAX_LISTED_REGIONS).collect(),
            data_year,
        })
    }

    /// Catchment summary; any failure yields the all-zero result
    pub async fn aggregate(
        &self,
        index: Option<&RegionIndex>,
        site: Coordinate,
        radius_km: f64,
        stats_year: i32,
    ) -> CatchmentResult {
        match self.try_aggregate(index, site, radius_km, stats_year).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Catchment at {} unavailable: {}", site, e);
                CatchmentResult::unavailable(radius_km, stats_year)
            }
        }
    }
}
