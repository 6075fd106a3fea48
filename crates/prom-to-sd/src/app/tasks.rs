use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::app::core::Application;
use crate::config::SourceConfig;
use crate::scheduler::SourceWorker;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

enum Wakeup {
    Signal,
    Cancelled,
    Finished(usize, std::result::Result<(), JoinError>),
}

/// Task manager, one task per source worker
pub struct Tasks {
    tasks: Vec<JoinHandle<()>>,
    names: Vec<String>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            names: Vec::new(),
            cancellation_token,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start one worker per configured source
    pub fn spawn_all_tasks(&mut self, app: &Application) -> Result<()> {
        for source in &app.settings().sources {
            let task = self.spawn_source_worker(app, source.clone());
            self.tasks.push(task);
            self.names.push(source.name.clone());
        }
        tracing::info!("Started {} source workers", self.tasks.len());
        Ok(())
    }

    fn spawn_source_worker(&self, app: &Application, source: SourceConfig) -> JoinHandle<()> {
        let services = app.services();
        let worker = SourceWorker::new(
            source,
            services.scraper.clone(),
            services.translator.clone(),
            services.sender.clone(),
        );
        let period = app.settings().resolution;
        let token = self.cancellation_token.clone();

        tokio::spawn(async move { worker.run(period, token).await })
    }

    /// Wait for a shutdown signal or cancellation. A worker that exits
    /// early (it only does so by panicking) is logged and the others keep
    /// running. Once no worker is left this returns an error.
    pub async fn wait_for_completion(&mut self) -> Result<()> {
        let mut signal_handler = {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate())?;
                let mut sigint = signal(SignalKind::interrupt())?;

                tokio::spawn(async move {
                    tokio::select! {
                        _ = sigterm.recv() => {
                            tracing::info!("Received SIGTERM, initiating graceful shutdown");
                        }
                        _ = sigint.recv() => {
                            tracing::info!("Received SIGINT, initiating graceful shutdown");
                        }
                    }
                })
            }
            #[cfg(not(unix))]
            {
                tokio::spawn(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for Ctrl+C: {e}");
                        return std::future::pending().await;
                    }
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                })
            }
        };

        loop {
            if self.tasks.is_empty() {
                signal_handler.abort();
                anyhow::bail!("all source workers exited");
            }

            let wakeup = tokio::select! {
                _ = &mut signal_handler => Wakeup::Signal,
                _ = self.cancellation_token.cancelled() => Wakeup::Cancelled,
                (result, index, _) = futures::future::select_all(self.tasks.iter_mut()) => {
                    Wakeup::Finished(index, result)
                }
            };

            match wakeup {
                Wakeup::Signal => {
                    tracing::info!("Shutdown signal received, cancelling all workers");
                    self.cancellation_token.cancel();
                    break;
                }
                Wakeup::Cancelled => {
                    signal_handler.abort();
                    break;
                }
                Wakeup::Finished(index, result) => {
                    self.tasks.remove(index);
                    let name = self.names.remove(index);
                    match result {
                        Err(e) if e.is_panic() => {
                            tracing::error!(source = %name, "source worker panicked: {e}");
                        }
                        Err(e) => tracing::error!(source = %name, "source worker failed: {e}"),
                        Ok(()) => tracing::warn!(source = %name, "source worker exited unexpectedly"),
                    }
                }
            }
        }

        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for (task, name) in self.tasks.iter_mut().zip(&self.names) {
                if let Err(e) = task.await {
                    tracing::error!(source = %name, "Worker failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Worker shutdown timed out after {:?}", timeout);
        });
    }
}
