//! Progress reporting for batch runs.
//!
//! The pipeline sends short status strings ("Pausing 2s...", "Processed 3/10")
//! to a [`ProgressObserver`]. Delivery is best-effort: observers never fail.

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Sink for pipeline status messages
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, message: &str);
}

/// Discards all messages
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn notify(&self, _message: &str) {}
}

/// Forwards messages to the tracing subscriber
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn notify(&self, message: &str) {
        info!("{}", message);
    }
}

/// Keeps every message in memory
#[derive(Default)]
pub struct CollectingObserver {
    messages: Mutex<Vec<String>>,
}

impl CollectingObserver {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl ProgressObserver for CollectingObserver {
    fn notify(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

/// Terminal progress bar, advanced on every "Processed i/total" message
pub struct BarObserver {
    bar: ProgressBar,
}

impl BarObserver {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

/// Parse "Processed i/total" into its position
fn processed_position(message: &str) -> Option<u64> {
    let rest = message.strip_prefix("Processed ")?;
    let (done, _) = rest.split_once('/')?;
    done.trim().parse().ok()
}

impl ProgressObserver for BarObserver {
    fn notify(&self, message: &str) {
        match processed_position(message) {
            Some(position) => self.bar.set_position(position),
            None => self.bar.set_message(message.to_string()),
        }
    }
}
