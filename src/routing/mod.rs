//! Exact road routing: provider trait, memoizing cache, and call pacing.

mod cache;
mod osrm;
mod pacing;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::geodesy::Coordinate;
use crate::models::RouteLeg;
use crate::progress::ProgressObserver;

pub use cache::{CacheStats, RouteCache, RouteKey};
pub use osrm::{OsrmClient, DEFAULT_OSRM_URL};
pub use pacing::RateLimiter;

/// Destination used by the routing connectivity test
pub const TEST_DESTINATION: Coordinate = Coordinate {
    lat: 50.1109,
    lon: 8.6821,
};

/// Failure of one exact-distance call
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    #[error("no route found: {0}")]
    NoRoute(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("routing request timed out")]
    Timeout,

    #[error("routing quota exhausted")]
    QuotaExhausted,

    #[error("malformed routing response: {0}")]
    Malformed(String),
}

impl RoutingError {
    /// Quota exhaustion ends routing for the current site
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoutingError::QuotaExhausted)
    }
}

impl From<reqwest::Error> for RoutingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RoutingError::Timeout
        } else if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            RoutingError::QuotaExhausted
        } else if e.is_decode() {
            RoutingError::Malformed(e.to_string())
        } else {
            RoutingError::Http(e.to_string())
        }
    }
}

/// Road-network distance between two points
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    async fn route(&self, origin: Coordinate, destination: Coordinate)
        -> Result<RouteLeg, RoutingError>;
}

/// Cache, pacing, and provider bundled for one pipeline.
///
/// Owned by a single processing task; all mutation goes through `&mut self`.
pub struct Router {
    provider: Arc<dyn RoutingProvider>,
    cache: RouteCache,
    limiter: RateLimiter,
    observer: Arc<dyn ProgressObserver>,
}

impl Router {
    pub fn new(
        provider: Arc<dyn RoutingProvider>,
        cache: RouteCache,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            provider,
            cache,
            limiter: RateLimiter::disabled(),
            observer,
        }
    }

    /// Routed distance between two points; cache hits cost nothing
    pub async fn route(
        &mut self,
        origin: Coordinate,
        destination: Coordinate,
    ) -> Result<RouteLeg, RoutingError> {
        let Self {
            provider,
            cache,
            limiter,
            observer,
        } = self;

        cache
            .get_or_compute(origin, destination, move || async move {
                limiter.acquire(observer.as_ref()).await;
                debug!("Routing {} -> {}", origin, destination);
                provider.route(origin, destination).await
            })
            .await
    }

    /// Pace and count a call to a non-routing provider that shares the quota
    pub async fn acquire_external(&mut self) {
        self.limiter.acquire(self.observer.as_ref()).await;
    }

    /// Replace the pacing settings; the call counter restarts at zero
    pub fn set_pacing(&mut self, limiter: RateLimiter) {
        self.limiter = limiter;
    }

    pub fn set_observer(&mut self, observer: Arc<dyn ProgressObserver>) {
        self.observer = observer;
    }

    /// Provider calls issued since pacing was last configured
    pub fn call_count(&self) -> u64 {
        self.limiter.calls()
    }

    pub fn cache(&self) -> &RouteCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Route directly, bypassing cache and pacing
    pub async fn check_connection(&self, origin: Coordinate) -> Result<RouteLeg, RoutingError> {
        self.provider.route(origin, TEST_DESTINATION).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeRouter;
    use super::*;
    use crate::progress::{CollectingObserver, NoopObserver};
    use std::time::Duration;

    fn router(provider: Arc<FakeRouter>) -> Router {
        Router::new(provider, RouteCache::new(None), Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn test_route_is_memoized() {
        let provider = Arc::new(FakeRouter::new());
        let mut router = router(provider.clone());
        let a = Coordinate::new(50.0, 10.0);
        let b = Coordinate::new(50.1, 8.7);

        let first = router.route(a, b).await.unwrap();
        assert_eq!(provider.calls(), 1);
        let second = router.route(a, b).await.unwrap();
        assert_eq!(provider.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(router.call_count(), 1);
        assert_eq!(router.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_failures_counted_not_cached() {
        let provider = Arc::new(FakeRouter::new());
        let a = Coordinate::new(50.0, 10.0);
        let b = Coordinate::new(51.0, 11.0);
        provider.set(a, b, Err(RoutingError::NoRoute("NoRoute".to_string())));
        let mut router = router(provider.clone());

        assert!(router.route(a, b).await.is_err());
        assert!(router.route(a, b).await.is_err());
        assert_eq!(provider.calls(), 2);
        assert_eq!(router.call_count(), 2);
        assert!(router.cache().is_empty());
    }

    #[tokio::test]
    async fn test_pacing_notifies_observer() {
        let provider = Arc::new(FakeRouter::new());
        let observer = Arc::new(CollectingObserver::default());
        let mut router = Router::new(provider, RouteCache::new(None), observer.clone());
        router.set_pacing(RateLimiter::new(2, Duration::from_millis(1)));

        let origin = Coordinate::new(50.0, 10.0);
        for i in 0..5 {
            let dest = Coordinate::new(51.0, 10.0 + i as f64 * 0.1);
            router.route(origin, dest).await.unwrap();
        }
        // Pauses before calls 3 and 5
        let pauses = observer
            .messages()
            .iter()
            .filter(|m| m.starts_with("Pausing"))
            .count();
        assert_eq!(pauses, 2);
        assert_eq!(router.call_count(), 5);
    }

    #[test]
    fn test_quota_is_fatal() {
        assert!(RoutingError::QuotaExhausted.is_fatal());
        assert!(!RoutingError::Timeout.is_fatal());
    }
}
