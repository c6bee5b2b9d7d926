//! Memoizing route cache.

use std::collections::VecDeque;
use std::future::Future;

use hashbrown::HashMap;
use serde::Serialize;
use tracing::debug;

use super::RoutingError;
use crate::geodesy::Coordinate;
use crate::models::RouteLeg;

/// Scale for rounding coordinates to 6 decimal places (~0.1 m)
const KEY_SCALE: f64 = 1e6;

/// Normalized (origin, destination) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteKey {
    origin: (i64, i64),
    destination: (i64, i64),
}

impl RouteKey {
    pub fn new(origin: Coordinate, destination: Coordinate) -> Self {
        Self {
            origin: scale(origin),
            destination: scale(destination),
        }
    }
}

fn scale(c: Coordinate) -> (i64, i64) {
    (
        (c.lat * KEY_SCALE).round() as i64,
        (c.lon * KEY_SCALE).round() as i64,
    )
}

/// Cache counters for status output
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

/// Route results keyed by rounded coordinate pair.
///
/// Entries are never overwritten. With a capacity set, the oldest entry is
/// evicted first.
pub struct RouteCache {
    entries: HashMap<RouteKey, RouteLeg>,
    order: VecDeque<RouteKey>,
    capacity: Option<usize>,
    hits: u64,
    misses: u64,
}

impl RouteCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&self, origin: Coordinate, destination: Coordinate) -> Option<RouteLeg> {
        self.entries
            .get(&RouteKey::new(origin, destination))
            .copied()
    }

    /// Store a result unless the key is already present
    fn insert(&mut self, key: RouteKey, leg: RouteLeg) {
        if self.entries.contains_key(&key) || self.capacity == Some(0) {
            return;
        }
        if let Some(capacity) = self.capacity {
            while self.entries.len() >= capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.entries.insert(key, leg);
        self.order.push_back(key);
    }

    /// Return the cached route, or run `compute` and store a successful result.
    ///
    /// Failures are returned as-is and never cached.
    pub async fn get_or_compute<F, Fut>(
        &mut self,
        origin: Coordinate,
        destination: Coordinate,
        compute: F,
    ) -> Result<RouteLeg, RoutingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RouteLeg, RoutingError>>,
    {
        let key = RouteKey::new(origin, destination);
        if let Some(leg) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(*leg);
        }

        self.misses += 1;
        let leg = compute().await?;
        self.insert(key, leg);
        Ok(leg)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
            capacity: self.capacity,
        }
    }

    pub fn clear(&mut self) {
        debug!("Clearing {} cached routes", self.entries.len());
        self.entries.clear();
        self.order.clear();
        self.hits = 0;
        self.misses = 0;
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(None)
    }
}
