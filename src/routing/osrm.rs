//! OSRM HTTP routing client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{RoutingError, RoutingProvider};
use crate::geodesy::Coordinate;
use crate::models::RouteLeg;

pub const DEFAULT_OSRM_URL: &str = "https://router.project-osrm.org";

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Metres
    distance: f64,
    /// Seconds
    duration: f64,
}

/// Routes via the OSRM `route` service
pub struct OsrmClient {
    client: Client,
    base_url: String,
    profile: String,
}

impl OsrmClient {
    pub fn new(client: Client, base_url: &str, profile: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: profile.to_string(),
        }
    }

    pub fn route_url(&self, origin: Coordinate, destination: Coordinate) -> Result<Url, RoutingError> {
        let mut url = Url::parse(&format!(
            "{}/route/v1/{}/{:.6},{:.6};{:.6},{:.6}",
            self.base_url,
            self.profile,
            origin.lon,
            origin.lat,
            destination.lon,
            destination.lat
        ))
        .map_err(|e| RoutingError::Http(format!("invalid routing URL: {}", e)))?;
        url.query_pairs_mut().append_pair("overview", "false");
        Ok(url)
    }
}

/// Decode an OSRM route response body
fn parse_route(body: &str) -> Result<RouteLeg, RoutingError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RoutingError::Malformed(e.to_string()))?;

    if response.code != "Ok" {
        let detail = match response.message {
            Some(message) => format!("{}: {}", response.code, message),
            None => response.code,
        };
        return Err(RoutingError::NoRoute(detail));
    }

    let route = response
        .routes
        .first()
        .ok_or_else(|| RoutingError::Malformed("response has no routes".to_string()))?;

    Ok(RouteLeg {
        distance_km: route.distance / 1000.0,
        duration_min: route.duration / 60.0,
    })
}

#[async_trait]
impl RoutingProvider for OsrmClient {
    async fn route(
        &self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteLeg, RoutingError> {
        let url = self.route_url(origin, destination)?;
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RoutingError::QuotaExhausted);
        }

        let body = response.text().await?;
        match parse_route(&body) {
            // OSRM reports NoRoute and friends with a 4xx and a JSON body
            Err(RoutingError::Malformed(_)) if !status.is_success() => {
                Err(RoutingError::Http(format!("OSRM HTTP {}", status.as_u16())))
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_url_is_lon_lat() {
        let client = OsrmClient::new(Client::new(), "https://router.example.org/", "driving");
        let url = client
            .route_url(Coordinate::new(51.0126, 6.5741), Coordinate::new(50.1109, 8.6821))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://router.example.org/route/v1/driving/6.574100,51.012600;8.682100,50.110900?overview=false"
        );
    }

    #[test]
    fn test_parse_ok() {
        let body = r#"{"code":"Ok","routes":[{"distance":12345.0,"duration":600.0,"weight":1}],"waypoints":[]}"#;
        let leg = parse_route(body).unwrap();
        assert!((leg.distance_km - 12.345).abs() < 1e-9);
        assert!((leg.duration_min - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_no_route() {
        let body = r#"{"code":"NoRoute","message":"Impossible route between points"}"#;
        match parse_route(body) {
            Err(RoutingError::NoRoute(detail)) => assert!(detail.starts_with("NoRoute")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_route("<html>"),
            Err(RoutingError::Malformed(_))
        ));
        assert!(matches!(
            parse_route(r#"{"code":"Ok","routes":[]}"#),
            Err(RoutingError::Malformed(_))
        ));
    }
}
