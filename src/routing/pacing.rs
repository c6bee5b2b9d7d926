//! Call pacing for rate-limited providers.

use std::time::Duration;

use tracing::info;

use crate::progress::ProgressObserver;

/// Counts provider calls and sleeps every `every` calls.
///
/// `every == 0` disables pacing; the counter still runs.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    every: u32,
    pause: Duration,
    calls: u64,
}

impl RateLimiter {
    pub fn new(every: u32, pause: Duration) -> Self {
        Self {
            every,
            pause,
            calls: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// True when the next call must wait first
    pub fn should_pause(&self) -> bool {
        self.calls > 0 && self.every > 0 && self.calls % u64::from(self.every) == 0
    }

    /// Wait if due, then count one call
    pub async fn acquire(&mut self, observer: &dyn ProgressObserver) {
        if self.should_pause() {
            let message = format!("Pausing {}s...", self.pause.as_secs_f64());
            info!("{} ({} calls so far)", message, self.calls);
            observer.notify(&message);
            tokio::time::sleep(self.pause).await;
        }
        self.calls += 1;
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}
