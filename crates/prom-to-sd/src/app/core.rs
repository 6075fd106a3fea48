use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::app::services::ApplicationServices;
use crate::app::tasks::Tasks;
use crate::config::Settings;

/// Application core structure with explicit dependencies
pub struct Application {
    services: ApplicationServices,
    settings: Settings,
}

impl Application {
    pub fn new(services: ApplicationServices, settings: Settings) -> Self {
        Self { services, settings }
    }

    pub fn services(&self) -> &ApplicationServices {
        &self.services
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Starts one worker per source and waits until a shutdown signal
    /// arrives or `token` is cancelled.
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        tracing::info!(
            sources = self.settings.sources.len(),
            "Starting source workers with resolution {:?}",
            self.settings.resolution
        );

        let mut tasks = Tasks::new(token);

        if let Err(e) = tasks.spawn_all_tasks(self) {
            tracing::error!("Failed to spawn application tasks: {}", e);
            return Err(e);
        }

        if let Err(e) = tasks.wait_for_completion().await {
            tracing::error!("Error during task execution: {}", e);
            return Err(e);
        }

        tracing::info!("Application run completed");
        Ok(())
    }
}
