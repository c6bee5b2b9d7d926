//! Eurostat regional statistics over the JSON-stat dissemination API.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const DEFAULT_EUROSTAT_URL: &str =
    "https://ec.europa.eu/eurostat/api/dissemination/statistics/1.0/data";

/// Labor-market indicators used by the catchment summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Population,
    Unemployed,
    ActivePopulation,
}

impl Indicator {
    pub fn dataset(&self) -> &'static str {
        match self {
            Indicator::Population => "demo_r_pjangrp3",
            Indicator::Unemployed => "lfst_r_lfu3rt",
            Indicator::ActivePopulation => "lfst_r_lfp3pop",
        }
    }

    /// Fixed dimension filters besides geo and time
    fn filters(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Indicator::Population => &[("age", "TOTAL"), ("sex", "T"), ("unit", "NR")],
            Indicator::Unemployed | Indicator::ActivePopulation => {
                &[("age", "Y15-74"), ("sex", "T"), ("unit", "THS_PER")]
            }
        }
    }

    /// Multiplier from published unit to persons
    pub fn scale(&self) -> f64 {
        match self {
            Indicator::Population => 1.0,
            Indicator::Unemployed | Indicator::ActivePopulation => 1000.0,
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Indicator::Population => "population",
            Indicator::Unemployed => "unemployed persons",
            Indicator::ActivePopulation => "active population",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatisticsError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("statistics request timed out")]
    Timeout,

    #[error("malformed JSON-stat response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for StatisticsError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            StatisticsError::Timeout
        } else if e.is_decode() {
            StatisticsError::Malformed(e.to_string())
        } else {
            StatisticsError::Http(e.to_string())
        }
    }
}

/// Per-region indicator values for one year. An empty map means "no data".
#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    async fn fetch(
        &self,
        indicator: Indicator,
        region_ids: &[String],
        year: i32,
    ) -> Result<HashMap<String, f64>, StatisticsError>;
}

#[derive(Debug, Deserialize)]
struct JsonStat {
    #[serde(default)]
    id: Vec<String>,
    #[serde(default)]
    size: Vec<usize>,
    #[serde(default)]
    dimension: HashMap<String, Dimension>,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct Dimension {
    category: Category,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    index: Value,
}

/// Category codes by position. `index` is either {code: pos} or [code, ...].
fn category_codes(index: &Value) -> HashMap<usize, String> {
    match index {
        Value::Object(map) => map
            .iter()
            .filter_map(|(code, pos)| pos.as_u64().map(|p| (p as usize, code.clone())))
            .collect(),
        Value::Array(codes) => codes
            .iter()
            .enumerate()
            .filter_map(|(pos, code)| code.as_str().map(|c| (pos, c.to_string())))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Flat index to value pairs; `value` is either {"idx": v} or a dense array
fn flat_values(value: &Value) -> Vec<(usize, f64)> {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(idx, v)| Some((idx.parse().ok()?, v.as_f64()?)))
            .collect(),
        Value::Array(values) => values
            .iter()
            .enumerate()
            .filter_map(|(idx, v)| Some((idx, v.as_f64()?)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a JSON-stat dataset into geo code -> value
pub fn decode_json_stat(body: &str) -> Result<HashMap<String, f64>, StatisticsError> {
    let stat: JsonStat =
        serde_json::from_str(body).map_err(|e| StatisticsError::Malformed(e.to_string()))?;

    if stat.id.len() != stat.size.len() {
        return Err(StatisticsError::Malformed(
            "id and size have different lengths".to_string(),
        ));
    }
    let Some(geo_axis) = stat.id.iter().position(|d| d == "geo") else {
        if flat_values(&stat.value).is_empty() {
            return Ok(HashMap::new());
        }
        return Err(StatisticsError::Malformed("no geo dimension".to_string()));
    };
    let geo_codes = stat
        .dimension
        .get("geo")
        .map(|d| category_codes(&d.category.index))
        .unwrap_or_default();

    let mut out = HashMap::new();
    for (flat, value) in flat_values(&stat.value) {
        // Row-major: the last dimension varies fastest
        let mut rest = flat;
        let mut geo_pos = 0;
        for (axis, size) in stat.size.iter().enumerate().rev() {
            let size = (*size).max(1);
            if axis == geo_axis {
                geo_pos = rest % size;
            }
            rest /= size;
        }
        if let Some(code) = geo_codes.get(&geo_pos) {
            out.insert(code.clone(), value);
        }
    }
    Ok(out)
}

/// Eurostat dissemination API client
pub struct EurostatClient {
    client: Client,
    base_url: String,
}

impl EurostatClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn request_url(
        &self,
        indicator: Indicator,
        region_ids: &[String],
        year: i32,
    ) -> Result<Url, StatisticsError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, indicator.dataset()))
            .map_err(|e| StatisticsError::Http(format!("invalid statistics URL: {}", e)))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("format", "JSON").append_pair("lang", "en");
            for id in region_ids {
                query.append_pair("geo", id);
            }
            query.append_pair("time", &year.to_string());
            for (key, value) in indicator.filters() {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl StatisticsProvider for EurostatClient {
    async fn fetch(
        &self,
        indicator: Indicator,
        region_ids: &[String],
        year: i32,
    ) -> Result<HashMap<String, f64>, StatisticsError> {
        if region_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = self.request_url(indicator, region_ids, year)?;
        debug!("Fetching {} for {} regions ({})", indicator, region_ids.len(), year);

        let response = self.client.get(url).send().await?;
        // Eurostat answers 404 / 400 when the filter selects nothing
        if response.status().is_client_error() {
            debug!("No {} data for {} ({})", indicator, year, response.status());
            return Ok(HashMap::new());
        }
        let body = response.error_for_status()?.text().await?;

        let scale = indicator.scale();
        Ok(decode_json_stat(&body)?
            .into_iter()
            .map(|(geo, v)| (geo, v * scale))
            .collect())
    }
}
