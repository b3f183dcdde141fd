//! Server startup utilities.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use resume_config::AppConfig;
use resume_core::{ResumeError, ResumeResult};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// How often histogram buckets are drained.
const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    ____                                ___   ____        __  __
   / __ \___  _______  ______ ___  ___ |__ \ / __ \____ _/ /_/ /_
  / /_/ / _ \/ ___/ / / / __ `__ \/ _ \__/ // /_/ / __ `/ __/ __ \
 / _, _/  __(__  ) /_/ / / / / / /  __/ __// ____/ /_/ / /_/ / / /
/_/ |_|\___/____/\__,_/_/ /_/ /_/\___/____/_/    \__,_/\__/_/ /_/

                         Job Queue
    "#);
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let role = config.deployment.role;
    info!("{}", separator);
    info!("Role:      {}", role);
    info!("Redis:     {}", config.redis.key_prefix);
    if role.serves_api() {
        let port = config.server.port;
        info!("REST API:  http://0.0.0.0:{}/api/v1", port);
        info!("Health:    http://0.0.0.0:{}/health", port);
        if config.observability.metrics_enabled {
            info!("Metrics:   http://0.0.0.0:{}/metrics", port);
        }
    }
    if role.runs_workers() {
        info!("Workers:   {}", config.jobs.worker.concurrency);
    }
    info!("{}", separator);
}

/// Installs the global Prometheus recorder and describes the job metrics.
pub fn install_metrics_recorder() -> ResumeResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ResumeError::Internal(format!("Failed to install metrics recorder: {}", e)))?;
    resume_jobs::register_metrics();

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
        loop {
            ticker.tick().await;
            upkeep.run_upkeep();
        }
    });

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resume_config::DeploymentRole;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_for_each_role() {
        let _ = tracing_subscriber::fmt::try_init();
        for role in [DeploymentRole::All, DeploymentRole::Api, DeploymentRole::Worker] {
            let mut config = AppConfig::default();
            config.deployment.role = role;
            print_startup_info(&config);
        }
    }
}
