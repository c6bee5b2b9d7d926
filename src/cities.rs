//! Major-city database for the nearest-city step.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::geodesy::Coordinate;
use crate::nearest::{prefilter, Located};

pub const DEFAULT_MIN_POPULATION: u64 = 100_000;
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct City {
    pub name: String,
    pub population: u64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub country: Option<String>,
}

impl Located for City {
    fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Cities at or above a population threshold
#[derive(Debug, Clone, Default)]
pub struct CityDatabase {
    cities: Vec<City>,
}

impl CityDatabase {
    pub fn new(cities: Vec<City>, min_population: u64) -> Self {
        Self {
            cities: cities
                .into_iter()
                .filter(|c| c.population >= min_population)
                .collect(),
        }
    }

    /// Read `name,population,latitude,longitude[,country]` rows; bad rows are skipped
    pub fn from_reader<R: Read>(reader: R, min_population: u64) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut cities = Vec::new();
        let mut skipped = 0usize;
        for (row, record) in csv.deserialize::<City>().enumerate() {
            match record {
                Ok(city) if Coordinate::new(city.latitude, city.longitude).is_valid() => {
                    cities.push(city)
                }
                Ok(city) => {
                    warn!("City row {} ({}) has invalid coordinates", row + 2, city.name);
                    skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping city row {}: {}", row + 2, e);
                    skipped += 1;
                }
            }
        }
        let db = Self::new(cities, min_population);
        info!(
            "Loaded {} cities with population >= {} ({} rows skipped)",
            db.len(),
            min_population,
            skipped
        );
        Ok(db)
    }

    pub fn load(path: &Path, min_population: u64) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open city database {}", path.display()))?;
        Self::from_reader(file, min_population)
    }

    /// Nearest city by great-circle distance, if within `max_km`
    pub fn nearest(&self, site: Coordinate, max_km: f64) -> Option<(&City, f64)> {
        prefilter(site, &self.cities, 1)
            .into_iter()
            .next()
            .filter(|(_, km)| *km <= max_km)
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
