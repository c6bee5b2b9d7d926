//! Lazily loaded catalog of region datasets.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{BoundaryProvider, BoundarySource, RegionBoundary, RegionIndex};

/// Load state of one dataset
#[derive(Clone)]
pub enum DatasetStatus {
    Ready(Arc<RegionIndex>),
    /// Load failed; the reason is kept until the next reload
    Unavailable(String),
}

/// Summary row for operator status output
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatasetSummary {
    pub name: String,
    pub location: String,
    pub ready: bool,
    pub regions: usize,
    pub dropped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Region datasets keyed by location, each loaded once on first use
pub struct RegionCatalog {
    provider: Arc<dyn BoundaryProvider>,
    datasets: HashMap<String, (BoundarySource, DatasetStatus)>,
}

impl RegionCatalog {
    pub fn new(provider: Arc<dyn BoundaryProvider>) -> Self {
        Self {
            provider,
            datasets: HashMap::new(),
        }
    }

    async fn load(&self, source: &BoundarySource) -> DatasetStatus {
        match self.provider.fetch(source).await {
            Ok(boundaries) => {
                let index = RegionIndex::build(boundaries);
                if index.is_empty() {
                    warn!("{} dataset has no usable geometries", source.name);
                    DatasetStatus::Unavailable("No valid geometries found".to_string())
                } else {
                    DatasetStatus::Ready(Arc::new(index))
                }
            }
            Err(e) => {
                warn!("{} dataset unavailable: {}", source.name, e);
                DatasetStatus::Unavailable(e.to_string())
            }
        }
    }

    /// Get the index for a dataset, loading it on first use
    pub async fn index(&mut self, source: &BoundarySource) -> Option<Arc<RegionIndex>> {
        if !self.datasets.contains_key(&source.location) {
            let status = self.load(source).await;
            self.datasets
                .insert(source.location.clone(), (source.clone(), status));
        }

        match self.datasets.get(&source.location) {
            Some((_, DatasetStatus::Ready(index))) => Some(Arc::clone(index)),
            _ => None,
        }
    }

    /// Find the region of a dataset containing a point. Unavailable datasets yield None.
    pub async fn lookup(
        &mut self,
        source: &BoundarySource,
        lat: f64,
        lon: f64,
    ) -> Option<Arc<RegionBoundary>> {
        let index = self.index(source).await?;
        let hit = index.lookup(lat, lon);
        debug!(
            "{} lookup at ({}, {}): {}",
            source.name,
            lat,
            lon,
            hit.as_ref().map_or("none", |b| b.area.code.as_str())
        );
        hit
    }

    /// Status of every dataset touched so far
    pub fn status(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> = self
            .datasets
            .values()
            .map(|(source, status)| match status {
                DatasetStatus::Ready(index) => DatasetSummary {
                    name: source.name.clone(),
                    location: source.location.clone(),
                    ready: true,
                    regions: index.len(),
                    dropped: index.dropped(),
                    error: None,
                },
                DatasetStatus::Unavailable(reason) => DatasetSummary {
                    name: source.name.clone(),
                    location: source.location.clone(),
                    ready: false,
                    regions: 0,
                    dropped: 0,
                    error: Some(reason.clone()),
                },
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Forget every dataset; the next lookup loads again
    pub fn clear(&mut self) {
        info!("Clearing {} cached region datasets", self.datasets.len());
        self.datasets.clear();
    }

    /// Drop and eagerly reload the given sources
    pub async fn reload(&mut self, sources: &[BoundarySource]) -> Vec<DatasetSummary> {
        self.clear();
        for source in sources {
            self.index(source).await;
        }
        self.status()
    }
}
