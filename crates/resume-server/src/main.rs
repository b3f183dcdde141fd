//! # Resume2Path Job Queue Server
//!
//! Main entry point. The deployment role selects what the process runs:
//! - **all**: HTTP API and workers in one process
//! - **api**: HTTP API only
//! - **worker**: workers and the stale-job reaper only

use resume_config::ConfigLoader;
use resume_core::{init_telemetry, shutdown_telemetry, ResumeResult};
use resume_server::app::AppBuilder;
use resume_server::startup::{
    install_metrics_recorder, print_banner, print_startup_info, shutdown_signal,
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("Application error: {}", e);
        shutdown_telemetry();
        std::process::exit(1);
    }
    shutdown_telemetry();
}

async fn run() -> ResumeResult<()> {
    // Load configuration
    let config = ConfigLoader::from_default_location()?.into_config();

    // Initialize logging
    init_telemetry(&config.observability.telemetry(&config.app.name))?;

    print_banner();
    info!("Starting Resume2Path job queue...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);
    print_startup_info(&config);

    let mut builder = AppBuilder::new();
    if config.observability.metrics_enabled {
        builder = builder.with_metrics(install_metrics_recorder()?);
    }

    let app = builder.with_config(config).build().await?;
    app.run(shutdown_signal()).await
}
