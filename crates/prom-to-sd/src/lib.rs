//! Scrapes Prometheus text exposition endpoints and forwards the samples to
//! the Cloud Monitoring (Stackdriver) time series API.

pub mod app;
pub mod config;
pub mod errors;
pub mod model;
pub mod scheduler;
pub mod scraper;
pub mod sender;
pub mod tracker;
pub mod translator;
