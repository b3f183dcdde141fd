//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use resume_jobs::{QueueManager, StatsReporter};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: QueueManager,
    pub stats: StatsReporter,
    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(manager: QueueManager) -> Self {
        let stats = StatsReporter::new(manager.store().clone());
        Self {
            manager,
            stats,
            metrics: None,
        }
    }

    /// Serves `handle` at the metrics endpoint.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
