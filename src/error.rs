//! Error kinds shared across the crate.
//!
//! Provider-specific errors (`RoutingError`, `StatisticsError`, ...) live
//! next to their providers.

use thiserror::Error;

/// Malformed caller input. Fails the whole run before any site is processed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{table}: missing required columns: {}", .columns.join(", "))]
    MissingColumns {
        table: String,
        columns: Vec<String>,
    },

    #[error("{table} row {row}: {column} is not numeric ({value:?})")]
    NotNumeric {
        table: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{table} row {row}: Latitude must be in [-90,90] and Longitude in [-180,180] (got {lat}, {lon})")]
    OutOfRange {
        table: String,
        row: usize,
        lat: f64,
        lon: f64,
    },

    #[error("{0}")]
    Invalid(String),
}

/// A boundary dataset could not be fetched or parsed.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("No valid geometries found")]
    Empty,
}

/// A region polygon that had to be dropped at index build time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("empty geometry")]
    Empty,

    #[error("unsupported geometry type {0}")]
    Unsupported(String),

    #[error("invalid geometry could not be repaired")]
    Unrepairable,
}

/// Run-level failure, distinct from per-site partial failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}
