//! Fetches the exposition payload of a monitored component.

pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use error_stack::Report;
use error_stack::ResultExt;

use crate::config::SourceConfig;
use crate::errors::ScrapeError;
use crate::model::MetricFamily;

/// Result of one successful scrape.
#[derive(Debug, Clone, Default)]
pub struct Scraped {
    pub families: Vec<MetricFamily>,
    /// Lines the parser had to drop.
    pub skipped_lines: usize,
}

/// Source of "now" for scrape timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Trait for fetching and parsing the metrics of one source
#[async_trait::async_trait]
pub trait Scrape: Send + Sync {
    async fn scrape(&self, source: &SourceConfig) -> Result<Scraped, Report<ScrapeError>>;
}

/// Plain HTTP GET scraper.
pub struct HttpScraper {
    client: reqwest::Client,
    timeout: Duration,
    clock: Arc<dyn TimeSource>,
}

impl HttpScraper {
    pub fn new(timeout: Duration) -> Result<Self, Report<ScrapeError>> {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(
        timeout: Duration,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, Report<ScrapeError>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .change_context(ScrapeError::Unreachable {
                url: String::new(),
                message: "failed to build HTTP client".to_string(),
            })?;
        Ok(Self {
            client,
            timeout,
            clock,
        })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> ScrapeError {
        if err.is_timeout() {
            ScrapeError::Timeout {
                url: url.to_string(),
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            ScrapeError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait::async_trait]
impl Scrape for HttpScraper {
    async fn scrape(&self, source: &SourceConfig) -> Result<Scraped, Report<ScrapeError>> {
        let url = source.url();

        let fetch = async {
            let response = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "text/plain;version=0.0.4")
                .send()
                .await
                .map_err(|e| Report::new(self.classify(&url, e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Report::new(ScrapeError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                }));
            }

            response
                .bytes()
                .await
                .map_err(|e| Report::new(self.classify(&url, e)))
        };

        // The client timeout only covers the request; bound the body read too.
        let body = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| {
                Report::new(ScrapeError::Timeout {
                    url: url.clone(),
                    millis: self.timeout.as_millis() as u64,
                })
            })??;

        // Large payloads take a while to parse; keep that off the runtime
        // threads shared with the other sources.
        let scraped_at = self.clock.now();
        let report = tokio::task::spawn_blocking(move || parser::parse(&body, scraped_at))
            .await
            .change_context(ScrapeError::Parse {
                message: "parser task failed".to_string(),
            })?
            .attach_printable_lazy(|| format!("source: {}", source.name))?;

        Ok(Scraped {
            families: report.families,
            skipped_lines: report.skipped_lines,
        })
    }
}
