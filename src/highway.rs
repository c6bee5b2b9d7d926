//! Nearest highway access point via the Overpass API.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::geodesy::Coordinate;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// Failure of a locator or geocoder call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LocatorError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("request timed out")]
    Timeout,

    #[error("rate limit exceeded")]
    QuotaExhausted,

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for LocatorError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LocatorError::Timeout
        } else if e.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            LocatorError::QuotaExhausted
        } else if e.is_decode() {
            LocatorError::Malformed(e.to_string())
        } else {
            LocatorError::Http(e.to_string())
        }
    }
}

/// A road node giving access to the highway network
#[derive(Debug, Clone, PartialEq)]
pub struct AccessPoint {
    pub id: Option<i64>,
    pub coordinate: Coordinate,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub highway_type: String,
    /// Great-circle distance from the site
    pub straight_km: f64,
}

impl AccessPoint {
    /// `name` tag, else `Junction {ref}`, else the highway type
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(reference) = &self.reference {
            return format!("Junction {}", reference);
        }
        format!("Highway Access ({})", self.highway_type)
    }
}

#[async_trait]
pub trait HighwayLocator: Send + Sync {
    async fn nearest_access(
        &self,
        site: Coordinate,
        radius_km: f64,
    ) -> Result<Option<AccessPoint>, LocatorError>;
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: Option<i64>,
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

fn junction_query(site: Coordinate, radius_km: f64) -> String {
    let around = format!("around:{},{},{}", radius_km * 1000.0, site.lat, site.lon);
    format!(
        "[out:json][timeout:25];\n(\n  node[\"highway\"=\"motorway_junction\"]({around});\n  way[\"highway\"~\"motorway_link|trunk_link\"]({around});\n  node(w);\n);\nout body;\n>;\nout skel qt;"
    )
}

fn major_road_query(site: Coordinate, radius_km: f64) -> String {
    let around = format!("around:{},{},{}", radius_km * 1000.0, site.lat, site.lon);
    format!(
        "[out:json][timeout:25];\n(\n  way[\"highway\"~\"primary|trunk\"]({around});\n  node(w);\n);\nout body;\n>;\nout skel qt;"
    )
}

fn parse_elements(body: &str) -> Result<Vec<OverpassElement>, LocatorError> {
    serde_json::from_str::<OverpassResponse>(body)
        .map(|r| r.elements)
        .map_err(|e| LocatorError::Malformed(e.to_string()))
}

/// Node with the smallest great-circle distance; the first one wins ties
fn nearest_node(elements: &[OverpassElement], site: Coordinate) -> Option<AccessPoint> {
    let mut best: Option<AccessPoint> = None;
    for element in elements.iter().filter(|e| e.kind == "node") {
        let (Some(lat), Some(lon)) = (element.lat, element.lon) else {
            continue;
        };
        let coordinate = Coordinate::new(lat, lon);
        let straight_km = site.haversine_km(&coordinate);
        if best.as_ref().map_or(true, |b| straight_km < b.straight_km) {
            let tag = |key: &str| element.tags.get(key).filter(|v| !v.is_empty()).cloned();
            best = Some(AccessPoint {
                id: element.id,
                coordinate,
                name: tag("name"),
                reference: tag("ref"),
                highway_type: tag("highway").unwrap_or_else(|| "junction".to_string()),
                straight_km,
            });
        }
    }
    best
}

/// Overpass interpreter client
pub struct OverpassClient {
    client: Client,
    url: String,
}

impl OverpassClient {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn query(&self, query: &str) -> Result<Vec<OverpassElement>, LocatorError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("data", query)
            .finish();
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        parse_elements(&response.text().await?)
    }
}

#[async_trait]
impl HighwayLocator for OverpassClient {
    async fn nearest_access(
        &self,
        site: Coordinate,
        radius_km: f64,
    ) -> Result<Option<AccessPoint>, LocatorError> {
        let mut elements = self.query(&junction_query(site, radius_km)).await?;
        if elements.is_empty() {
            debug!("No motorway access near {}, trying major roads", site);
            elements = self.query(&major_road_query(site, radius_km)).await?;
        }
        Ok(nearest_node(&elements, site))
    }
}
