//! Region boundary loading from GeoJSON datasets.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use geo::{BoundingRect, MultiPolygon};
use geojson::{FeatureCollection, GeoJson, JsonObject};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DatasetError;
use crate::models::{RegionArea, RegionLevel};
use crate::pip::geometry::to_multipolygon;

/// A single region polygon with metadata
#[derive(Debug, Clone)]
pub struct RegionBoundary {
    pub area: RegionArea,
    pub geometry: MultiPolygon<f64>,
}

impl RegionBoundary {
    /// Get the bounding box of this boundary
    pub fn bbox(&self) -> Option<(f64, f64, f64, f64)> {
        self.geometry
            .bounding_rect()
            .map(|rect| (rect.min().x, rect.min().y, rect.max().x, rect.max().y))
    }
}

/// Which feature properties carry the region code and name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub code_field: String,
    pub name_field: String,
    #[serde(default)]
    pub alt_code_fields: Vec<String>,
    #[serde(default)]
    pub alt_name_fields: Vec<String>,
    #[serde(default)]
    pub country_field: Option<String>,
}

impl FieldMapping {
    /// Eurostat GISCO NUTS properties
    pub fn nuts() -> Self {
        Self {
            code_field: "NUTS_ID".to_string(),
            name_field: "NAME_LATN".to_string(),
            alt_code_fields: vec!["id".to_string()],
            alt_name_fields: vec!["NUTS_NAME".to_string()],
            country_field: Some("CNTR_CODE".to_string()),
        }
    }

    /// Polish PRG (TERYT) administrative boundaries
    pub fn prg() -> Self {
        Self {
            code_field: "JPT_KOD_JE".to_string(),
            name_field: "JPT_NAZWA_".to_string(),
            alt_code_fields: vec!["TERYT".to_string(), "TERC".to_string()],
            alt_name_fields: vec!["NAZWA".to_string()],
            country_field: None,
        }
    }

    fn first_present(properties: &JsonObject, primary: &str, alternates: &[String]) -> Option<String> {
        std::iter::once(primary)
            .chain(alternates.iter().map(String::as_str))
            .find_map(|key| properties.get(key).and_then(property_text))
    }

    pub fn code(&self, properties: &JsonObject) -> Option<String> {
        Self::first_present(properties, &self.code_field, &self.alt_code_fields)
    }

    pub fn name(&self, properties: &JsonObject) -> Option<String> {
        Self::first_present(properties, &self.name_field, &self.alt_name_fields)
    }

    pub fn country(&self, properties: &JsonObject) -> Option<String> {
        self.country_field
            .as_ref()
            .and_then(|field| properties.get(field))
            .and_then(property_text)
    }
}

/// Property value as non-empty text (codes are sometimes numeric)
fn property_text(value: &serde_json::Value) -> Option<String> {
    let text = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Where a boundary dataset comes from and how to read it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundarySource {
    /// Short name used in logs and status output
    pub name: String,
    /// HTTP(S) URL or local path (`.gz` is decompressed)
    pub location: String,
    pub level: RegionLevel,
    pub fields: FieldMapping,
}

impl BoundarySource {
    pub fn new(name: &str, location: &str, level: RegionLevel, fields: FieldMapping) -> Self {
        Self {
            name: name.to_string(),
            location: location.to_string(),
            level,
            fields,
        }
    }

    fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }
}

/// Parse a GeoJSON FeatureCollection into region boundaries.
///
/// Features without geometry, with non-areal geometry, or without any code
/// or name are skipped. Load order is preserved.
pub fn parse_boundaries(
    text: &str,
    level: RegionLevel,
    fields: &FieldMapping,
) -> Result<Vec<RegionBoundary>, DatasetError> {
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| DatasetError::Parse {
        message: e.to_string(),
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        GeoJson::Feature(f) => FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        },
        GeoJson::Geometry(_) => {
            return Err(DatasetError::Parse {
                message: "expected a FeatureCollection, got a bare geometry".to_string(),
            })
        }
    };

    let empty = JsonObject::new();
    let mut boundaries = Vec::with_capacity(collection.features.len());
    let mut skipped = 0usize;

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            skipped += 1;
            continue;
        };

        let geometry: geo::Geometry<f64> = match geometry.try_into() {
            Ok(g) => g,
            Err(e) => {
                debug!("Skipping feature with unconvertible geometry: {}", e);
                skipped += 1;
                continue;
            }
        };

        let multi_polygon = match to_multipolygon(geometry) {
            Ok(mp) => mp,
            Err(e) => {
                debug!("Skipping feature: {}", e);
                skipped += 1;
                continue;
            }
        };

        let properties = feature.properties.as_ref().unwrap_or(&empty);
        let code = fields.code(properties);
        let name = fields.name(properties);

        if code.is_none() && name.is_none() {
            skipped += 1;
            continue;
        }

        let mut area = RegionArea::new(
            code.as_deref().unwrap_or(""),
            name.as_deref().unwrap_or(""),
            level,
        );
        area.country = fields.country(properties);

        boundaries.push(RegionBoundary {
            area,
            geometry: multi_polygon,
        });
    }

    if skipped > 0 {
        debug!("Skipped {} features while parsing {:?} boundaries", skipped, level);
    }

    if boundaries.is_empty() {
        return Err(DatasetError::Empty);
    }

    Ok(boundaries)
}

/// Source of boundary datasets
#[async_trait]
pub trait BoundaryProvider: Send + Sync {
    async fn fetch(&self, source: &BoundarySource) -> Result<Vec<RegionBoundary>, DatasetError>;
}

/// Loads GeoJSON boundaries over HTTP or from local files
pub struct GeoJsonBoundaryProvider {
    client: Client,
    max_attempts: u32,
}

impl GeoJsonBoundaryProvider {
    pub fn new(client: Client, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    async fn download(&self, url: &str) -> Result<String, DatasetError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let response = self.client.get(url).send().await?.error_for_status()?;
                response.text().await
            }
            .await;

            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_timeout() && attempt < self.max_attempts => {
                    let backoff = retry_backoff(attempt);
                    warn!(
                        "Dataset download timed out (attempt {}/{}), retrying in {:?}",
                        attempt, self.max_attempts, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Wait before the next attempt: 1 s, 2 s, 4 s ... capped at one minute
fn retry_backoff(attempt: u32) -> Duration {
    const MAX_BACKOFF_SECS: u64 = 60;
    let secs = 2u64
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(MAX_BACKOFF_SECS);
    Duration::from_secs(secs.min(MAX_BACKOFF_SECS))
}

/// Read a local dataset file, decompressing `.gz`
pub fn read_local(path: &Path) -> Result<String, DatasetError> {
    let file = File::open(path)?;
    let mut reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(flate2::read::GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

#[async_trait]
impl BoundaryProvider for GeoJsonBoundaryProvider {
    async fn fetch(&self, source: &BoundarySource) -> Result<Vec<RegionBoundary>, DatasetError> {
        info!("Loading {} boundaries from {}", source.name, source.location);

        let text = if source.is_remote() {
            self.download(&source.location).await?
        } else {
            read_local(Path::new(&source.location))?
        };

        let boundaries = parse_boundaries(&text, source.level, &source.fields)?;
        info!("Parsed {} {} boundaries", boundaries.len(), source.name);
        Ok(boundaries)
    }
}
