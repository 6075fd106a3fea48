use std::process::ExitCode;

use clap::Parser;
use prom_to_sd::app::ApplicationBuilder;
use prom_to_sd::config::Cli;
use tokio_util::sync::CancellationToken;
use utils::logging;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init(cli.log_file.as_deref());

    tracing::info!("Starting prom-to-sd {}", &**version::VERSION);

    let settings = match cli.into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    for source in &settings.sources {
        tracing::info!("Watching source {source}");
    }

    let app = match ApplicationBuilder::new(settings).build() {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build application: {e:?}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = app.run(CancellationToken::new()).await {
        tracing::error!("Application failed: {e:?}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
