//! Application builder.

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use resume_config::AppConfig;
use resume_core::{ResumeError, ResumeResult};
use resume_jobs::{
    spawn_event_logger, Collaborators, EmailTemplates, HandlerRegistry, JobStore, QueueManager,
    RedisJobStore, StaleJobReaper, WorkerPool, WorkerPoolConfig,
};
use resume_rest::{create_router, AppState};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Application builder for constructing the server.
#[derive(Default)]
pub struct AppBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn JobStore>>,
    collaborators: Option<Collaborators>,
    metrics: Option<PrometheusHandle>,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses `store` instead of connecting to Redis.
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses `collaborators` instead of the HTTP-backed ones.
    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Serves `handle` at the metrics endpoint.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Connects the store and builds the queue components.
    pub async fn build(self) -> ResumeResult<App> {
        let config = self.config.unwrap_or_default();

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(RedisJobStore::connect(&config.redis).await?) as Arc<dyn JobStore>,
        };

        let collaborators = match self.collaborators {
            Some(collaborators) => collaborators,
            None => Collaborators::from_config(&config.integrations)?,
        };
        if !config.integrations.email.is_configured() {
            info!("Email API key not set, emails will be skipped");
        }

        let templates = EmailTemplates::new(config.integrations.email.public_app_url.clone());
        let registry = Arc::new(HandlerRegistry::with_defaults(collaborators, templates));
        let manager = QueueManager::new(store, config.jobs.queues.clone());

        Ok(App {
            config,
            manager,
            registry,
            metrics: self.metrics,
        })
    }
}

/// A built application, ready to run in its configured role.
pub struct App {
    config: AppConfig,
    manager: QueueManager,
    registry: Arc<HandlerRegistry>,
    metrics: Option<PrometheusHandle>,
}

impl App {
    /// Loaded configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Queue producer shared by the API and the handlers.
    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    /// Builds the HTTP router.
    pub fn router(&self) -> Router {
        let mut state = AppState::new(self.manager.clone());
        if let Some(handle) = &self.metrics {
            state = state.with_metrics(handle.clone());
        }
        create_router(state, &self.config.server)
    }

    /// Builds a worker pool over every queue.
    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.manager.clone(),
            self.registry.clone(),
            WorkerPoolConfig::from(&self.config.jobs.worker),
        )
    }

    /// Builds the stale-job reaper.
    pub fn reaper(&self) -> StaleJobReaper {
        let worker = &self.config.jobs.worker;
        StaleJobReaper::new(
            self.manager.clone(),
            worker.stale_after(),
            worker.reaper_interval(),
        )
    }

    /// Runs the parts selected by the deployment role until `shutdown`
    /// resolves, then drains the workers.
    pub async fn run<F>(self, shutdown: F) -> ResumeResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let role = self.config.deployment.role;
        info!(role = %role, "Starting application");

        let event_logger = spawn_event_logger(self.manager.subscribe());
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let mut workers = None;
        let mut reaper = None;
        if role.runs_workers() {
            let pool = self.worker_pool();
            pool.start()?;
            reaper = Some(self.reaper().spawn(shutdown_tx.subscribe()));
            workers = Some(pool);
        }

        if role.serves_api() {
            let addr = self.config.server.addr();
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| ResumeError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
            info!("Starting REST server on http://{}", addr);

            axum::serve(listener, self.router())
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|e| ResumeError::Internal(format!("REST server error: {}", e)))?;
        } else {
            shutdown.await;
        }

        let _ = shutdown_tx.send(());
        if let Some(pool) = workers {
            pool.shutdown().await;
        }
        if let Some(reaper) = reaper {
            if let Err(e) = reaper.await {
                error!(error = %e, "Stale job reaper task failed");
            }
        }
        event_logger.abort();

        info!("Application shutdown complete");
        Ok(())
    }
}
