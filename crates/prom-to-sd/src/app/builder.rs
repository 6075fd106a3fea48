use std::sync::Arc;

use anyhow::Result;

use crate::app::Application;
use crate::app::ApplicationServices;
use crate::config::Settings;
use crate::scraper::HttpScraper;
use crate::scraper::Scrape;
use crate::sender::BatchSender;
use crate::sender::MetricWriter;
use crate::sender::StackdriverWriter;
use crate::translator::Translator;

/// Application builder
pub struct ApplicationBuilder {
    settings: Settings,
    scraper: Option<Arc<dyn Scrape>>,
    writer: Option<Arc<dyn MetricWriter>>,
}

impl ApplicationBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            scraper: None,
            writer: None,
        }
    }

    /// Replaces the HTTP scraper.
    pub fn with_scraper(mut self, scraper: Arc<dyn Scrape>) -> Self {
        self.scraper = Some(scraper);
        self
    }

    /// Replaces the monitoring API writer.
    pub fn with_writer(mut self, writer: Arc<dyn MetricWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Build complete application
    pub fn build(self) -> Result<Application> {
        tracing::info!("Building application components...");
        let settings = self.settings;

        let scraper = match self.scraper {
            Some(scraper) => scraper,
            None => Arc::new(
                HttpScraper::new(settings.scrape_timeout)
                    .map_err(|e| anyhow::anyhow!("failed to create scraper: {e:?}"))?,
            ),
        };

        let writer = match self.writer {
            Some(writer) => writer,
            None => {
                let writer = StackdriverWriter::new(
                    &settings.api_endpoint,
                    &settings.resource.project,
                    settings.token.clone(),
                    settings.write_timeout,
                )
                .map_err(|e| anyhow::anyhow!("failed to create monitoring writer: {e:?}"))?;
                tracing::info!("Writing time series to {}", writer.url());
                Arc::new(writer)
            }
        };

        let translator = Translator::new(settings.metrics_prefix.clone(), settings.resource.clone());
        let sender = BatchSender::new(writer, settings.max_batch_size);

        let services = ApplicationServices {
            scraper,
            translator: Arc::new(translator),
            sender: Arc::new(sender),
        };

        Ok(Application::new(services, settings))
    }
}
