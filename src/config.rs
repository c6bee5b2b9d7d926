//! TOML configuration for endpoints, datasets, and run defaults.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::catchment::{CatchmentAggregator, EurostatClient, DEFAULT_EUROSTAT_URL};
use crate::cities::{CityDatabase, DEFAULT_MAX_DISTANCE_KM, DEFAULT_MIN_POPULATION};
use crate::geocode::{NominatimClient, DEFAULT_NOMINATIM_URL};
use crate::highway::{OverpassClient, DEFAULT_OVERPASS_URL};
use crate::models::RegionLevel;
use crate::pip::{BoundarySource, FieldMapping, GeoJsonBoundaryProvider, RegionCatalog};
use crate::pipeline::{BatchPipeline, RunOptions};
use crate::progress::ProgressObserver;
use crate::routing::{OsrmClient, RouteCache, Router, DEFAULT_OSRM_URL};

pub const NUTS2_URL: &str = "https://gisco-services.ec.europa.eu/distribution/v2/nuts/geojson/NUTS_RG_01M_2021_4326_LEVL_2.geojson";
pub const NUTS3_URL: &str = "https://gisco-services.ec.europa.eu/distribution/v2/nuts/geojson/NUTS_RG_01M_2021_4326_LEVL_3.geojson";

const PRG_WFS: &str = "https://mapy.geoportal.gov.pl/wss/service/PZGIK/PRG/WFS/AdministrativeBoundaries?SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&OUTPUTFORMAT=application/json&TYPENAMES=prg:";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub routing: RoutingConfig,
    pub statistics: StatisticsConfig,
    pub datasets: DatasetsConfig,
    pub highway: HighwayConfig,
    pub geocoder: GeocoderConfig,
    pub cities: CitiesConfig,
    pub run: RunOptions,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub routing_timeout_secs: u64,
    pub statistics_timeout_secs: u64,
    pub highway_timeout_secs: u64,
    pub geocoder_timeout_secs: u64,
    pub dataset_timeout_secs: u64,
    pub dataset_attempts: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("roadscout/{}", env!("CARGO_PKG_VERSION")),
            routing_timeout_secs: 20,
            statistics_timeout_secs: 30,
            highway_timeout_secs: 30,
            geocoder_timeout_secs: 12,
            dataset_timeout_secs: 30,
            dataset_attempts: 3,
        }
    }
}

impl HttpConfig {
    /// HTTP client with the shared user agent and the given timeout
    pub fn client(&self, timeout_secs: u64) -> Result<Client> {
        Client::builder()
            .user_agent(&self.user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to create HTTP client")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RoutingConfig {
    pub url: String,
    pub profile: String,
    /// Maximum cached routes; unbounded when absent
    pub cache_capacity: Option<usize>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OSRM_URL.to_string(),
            profile: "driving".to_string(),
            cache_capacity: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatisticsConfig {
    pub url: String,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EUROSTAT_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatasetsConfig {
    pub nuts2: BoundarySource,
    pub nuts3: BoundarySource,
    /// National admin levels; empty disables the official lookup
    pub admin: Vec<BoundarySource>,
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            nuts2: BoundarySource::new("NUTS2", NUTS2_URL, RegionLevel::Nuts2, FieldMapping::nuts()),
            nuts3: BoundarySource::new("NUTS3", NUTS3_URL, RegionLevel::Nuts3, FieldMapping::nuts()),
            admin: vec![
                BoundarySource::new(
                    "PRG wojewodztwa",
                    &format!("{}wojewodztwa", PRG_WFS),
                    RegionLevel::AdminRegion,
                    FieldMapping::prg(),
                ),
                BoundarySource::new(
                    "PRG powiaty",
                    &format!("{}powiaty", PRG_WFS),
                    RegionLevel::AdminCounty,
                    FieldMapping::prg(),
                ),
                BoundarySource::new(
                    "PRG gminy",
                    &format!("{}gminy", PRG_WFS),
                    RegionLevel::AdminMunicipality,
                    FieldMapping::prg(),
                ),
            ],
        }
    }
}

impl DatasetsConfig {
    /// Every configured source, NUTS first
    pub fn all(&self) -> Vec<BoundarySource> {
        let mut sources = vec![self.nuts2.clone(), self.nuts3.clone()];
        sources.extend(self.admin.iter().cloned());
        sources
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HighwayConfig {
    pub url: String,
    pub radius_km: f64,
}

impl Default for HighwayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OVERPASS_URL.to_string(),
            radius_km: 50.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeocoderConfig {
    pub url: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_NOMINATIM_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CitiesConfig {
    /// CSV with name,population,latitude,longitude[,country]; the step is skipped without it
    pub path: Option<PathBuf>,
    pub min_population: u64,
    pub max_distance_km: f64,
}

impl Default for CitiesConfig {
    fn default() -> Self {
        Self {
            path: None,
            min_population: DEFAULT_MIN_POPULATION,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct NotificationConfig {
    /// Discord webhook notified at run start and completion
    pub discord_webhook: Option<String>,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load `path` if given, otherwise built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Ok(Self::default()),
        }
    }

    /// Wire the HTTP providers, route cache, and city database into a pipeline
    pub fn build_pipeline(&self, observer: Arc<dyn ProgressObserver>) -> Result<BatchPipeline> {
        let http = &self.http;

        let osrm = OsrmClient::new(
            http.client(http.routing_timeout_secs)?,
            &self.routing.url,
            &self.routing.profile,
        );
        let router = Router::new(
            Arc::new(osrm),
            RouteCache::new(self.routing.cache_capacity),
            Arc::clone(&observer),
        );

        let boundaries = GeoJsonBoundaryProvider::new(
            http.client(http.dataset_timeout_secs)?,
            http.dataset_attempts,
        );
        let statistics = EurostatClient::new(
            http.client(http.statistics_timeout_secs)?,
            &self.statistics.url,
        );

        let mut pipeline = BatchPipeline::new(
            router,
            RegionCatalog::new(Arc::new(boundaries)),
            CatchmentAggregator::new(Arc::new(statistics)),
            self.datasets.clone(),
            observer,
        )
        .with_highway(
            Arc::new(OverpassClient::new(
                http.client(http.highway_timeout_secs)?,
                &self.highway.url,
            )),
            self.highway.radius_km,
        )
        .with_geocoder(Arc::new(NominatimClient::new(
            http.client(http.geocoder_timeout_secs)?,
            &self.geocoder.url,
        )));

        match &self.cities.path {
            Some(path) => {
                let db = CityDatabase::load(path, self.cities.min_population)?;
                pipeline = pipeline.with_cities(db, self.cities.max_distance_km);
            }
            None => info!("No city database configured; nearest-city step disabled"),
        }

        Ok(pipeline)
    }
}
