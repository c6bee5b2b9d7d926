//! Reverse geocoding of administrative units via Nominatim.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use crate::geodesy::Coordinate;
use crate::highway::LocatorError;
use crate::models::RegionEntry;

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";

/// Administrative units around a point, coarse to fine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminAddress {
    pub municipality: RegionEntry,
    pub county: RegionEntry,
    pub region: RegionEntry,
}

impl AdminAddress {
    pub fn is_empty(&self) -> bool {
        self.municipality.is_empty() && self.county.is_empty() && self.region.is_empty()
    }
}

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, point: Coordinate) -> Result<AdminAddress, LocatorError>;
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: HashMap<String, String>,
    #[serde(default)]
    extratags: Option<HashMap<String, String>>,
}

fn first_of(map: &HashMap<String, String>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_empty()).cloned())
}

/// Map a Nominatim `jsonv2` reverse response to admin units
fn parse_reverse(body: &str) -> Result<AdminAddress, LocatorError> {
    let response: ReverseResponse =
        serde_json::from_str(body).map_err(|e| LocatorError::Malformed(e.to_string()))?;
    let address = &response.address;
    let extra = response.extratags.unwrap_or_default();

    Ok(AdminAddress {
        municipality: RegionEntry::new(
            first_of(address, &["municipality", "city", "town", "village", "suburb"]),
            first_of(&extra, &["ref:teryt:simc", "ref:teryt"]),
        ),
        county: RegionEntry::new(
            first_of(address, &["county", "state_district"]),
            first_of(&extra, &["ref:teryt:powiat"]),
        ),
        region: RegionEntry::new(
            first_of(address, &["state"]),
            first_of(&extra, &["ref:teryt:wojewodztwo"])
                .or_else(|| first_of(address, &["ISO3166-2-lvl4"])),
        ),
    })
}

/// Nominatim `/reverse` client
pub struct NominatimClient {
    client: Client,
    url: String,
}

impl NominatimClient {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    fn request_url(&self, point: Coordinate) -> Result<Url, LocatorError> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| LocatorError::Http(format!("invalid geocoder URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("format", "jsonv2")
            .append_pair("lat", &point.lat.to_string())
            .append_pair("lon", &point.lon.to_string())
            .append_pair("addressdetails", "1")
            .append_pair("extratags", "1");
        Ok(url)
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimClient {
    async fn reverse(&self, point: Coordinate) -> Result<AdminAddress, LocatorError> {
        let url = self.request_url(point)?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        parse_reverse(&response.text().await?)
    }
}
