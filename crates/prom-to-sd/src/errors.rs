use core::error::Error;

use derive_more::Display;

/// Failure to obtain a usable payload from a monitored endpoint.
#[derive(Debug, Display)]
pub enum ScrapeError {
    #[display("Endpoint {url} unreachable: {message}")]
    Unreachable { url: String, message: String },

    #[display("Endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[display("Scrape of {url} timed out after {millis}ms")]
    Timeout { url: String, millis: u64 },

    #[display("Unparseable exposition payload: {message}")]
    Parse { message: String },
}

impl Error for ScrapeError {}

/// Failure to deliver one batch to the monitoring backend.
#[derive(Debug, Display)]
pub enum DeliveryError {
    #[display("Backend rejected {points} points with status {status}")]
    Rejected { status: u16, points: usize },

    #[display("Backend unreachable, dropped {points} points: {message}")]
    Unreachable { points: usize, message: String },

    #[display("Write of {points} points timed out after {millis}ms")]
    Timeout { points: usize, millis: u64 },

    #[display("Failed to encode {points} points: {message}")]
    Encode { points: usize, message: String },

    #[display("No bearer token available: {message}")]
    Auth { message: String },
}

impl DeliveryError {
    /// Number of points lost with the failed batch.
    pub fn points(&self) -> usize {
        match self {
            DeliveryError::Rejected { points, .. }
            | DeliveryError::Unreachable { points, .. }
            | DeliveryError::Timeout { points, .. }
            | DeliveryError::Encode { points, .. } => *points,
            DeliveryError::Auth { .. } => 0,
        }
    }

    /// HTTP status reported by the backend, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Error for DeliveryError {}

/// Startup configuration errors; always fatal.
#[derive(Debug, Display)]
pub enum ConfigError {
    #[display("Invalid source `{source_spec}`: {message}")]
    InvalidSource {
        source_spec: String,
        message: String,
    },

    #[display("No sources defined. Please specify at least one --source flag.")]
    NoSources,

    #[display("Duplicate source name `{name}`")]
    DuplicateSource { name: String },

    #[display("{name} ({timeout:?}) must be shorter than the metrics resolution ({resolution:?})")]
    InvalidTimeout {
        name: &'static str,
        timeout: std::time::Duration,
        resolution: std::time::Duration,
    },

    #[display("Missing required setting: {name}")]
    Missing { name: &'static str },

    #[display("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },
}

impl Error for ConfigError {}
