//! Application configuration structures.

use crate::DeploymentRole;
use resume_core::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Deployment configuration.
    #[serde(default)]
    pub deployment: DeploymentConfig,

    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,

    /// Worker and per-queue settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// External HTTP services called by job handlers.
    #[serde(default)]
    pub integrations: IntegrationsConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "resume2path-queue".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Enable CORS.
    pub cors_enabled: bool,
    /// CORS allowed origins.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_size: 1024 * 1024, // 1MB, resume text is capped well below this
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ServerConfig {
    /// Returns the bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Deployment configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentConfig {
    /// Role of this process.
    pub role: DeploymentRole,
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis URL.
    pub url: String,
    /// Connection pool size.
    pub pool_size: usize,
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Key prefix for all job-related keys.
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            connect_timeout_secs: 5,
            key_prefix: "resume2path:jobs".to_string(),
        }
    }
}

impl RedisConfig {
    /// Returns the connect timeout as a Duration.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Job system configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Per-queue retry and retention settings.
    #[serde(default)]
    pub queues: QueuesConfig,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops per process.
    pub concurrency: usize,
    /// Sleep between polls when every queue is empty, in milliseconds.
    pub poll_interval_ms: u64,
    /// Upper bound on a single handler run, in seconds.
    pub job_timeout_secs: u64,
    /// How long shutdown waits for in-flight jobs, in seconds.
    pub shutdown_timeout_secs: u64,
    /// A job active longer than this is considered stalled, in seconds.
    /// Must exceed `job_timeout_secs`.
    pub stale_after_secs: u64,
    /// How often the stale-job reaper scans, in seconds.
    pub reaper_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 250,
            job_timeout_secs: 180,
            shutdown_timeout_secs: 30,
            stale_after_secs: 300,
            reaper_interval_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Returns poll interval as Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns job timeout as Duration.
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Returns shutdown timeout as Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the stall threshold as Duration.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Returns the reaper interval as Duration.
    #[must_use]
    pub const fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

/// Settings for each named queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// The `analysis` queue.
    #[serde(default = "QueueSettings::analysis")]
    pub analysis: QueueSettings,
    /// The `email` queue.
    #[serde(default = "QueueSettings::email")]
    pub email: QueueSettings,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            analysis: QueueSettings::analysis(),
            email: QueueSettings::email(),
        }
    }
}

/// Retry and retention options applied to jobs enqueued on one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Maximum number of executions before the job is failed.
    pub attempts: u32,
    /// Retry backoff.
    pub backoff: BackoffConfig,
    /// Number of completed jobs kept (0 keeps all).
    pub remove_on_complete: usize,
    /// Number of failed jobs kept (0 keeps all).
    pub remove_on_fail: usize,
}

impl QueueSettings {
    /// Defaults for the `analysis` queue.
    #[must_use]
    pub fn analysis() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffConfig::exponential(2000),
            remove_on_complete: 10,
            remove_on_fail: 5,
        }
    }

    /// Defaults for the `email` queue.
    #[must_use]
    pub fn email() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffConfig::exponential(1000),
            remove_on_complete: 20,
            remove_on_fail: 10,
        }
    }
}

/// Shape of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `delay * 2^attempts`
    #[default]
    Exponential,
    /// Same delay every time.
    Fixed,
}

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Strategy.
    #[serde(rename = "type")]
    pub strategy: BackoffStrategy,
    /// Base delay in milliseconds.
    pub delay_ms: u64,
    /// Cap on any single delay in milliseconds.
    pub max_delay_ms: u64,
}

impl BackoffConfig {
    /// Exponential backoff from `delay_ms`, capped at one hour.
    #[must_use]
    pub const fn exponential(delay_ms: u64) -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            delay_ms,
            max_delay_ms: 3_600_000,
        }
    }
}

/// External HTTP services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Base URL of the web app hosting `/api/gemini` and `/api/analysis/{id}`.
    pub app_url: String,
    /// Timeout for the LLM analysis call, in seconds.
    pub analysis_timeout_secs: u64,
    /// Timeout for persisting an analysis result, in seconds.
    pub result_store_timeout_secs: u64,
    /// Email delivery.
    #[serde(default)]
    pub email: EmailConfig,
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            analysis_timeout_secs: 120,
            result_store_timeout_secs: 30,
            email: EmailConfig::default(),
        }
    }
}

impl IntegrationsConfig {
    /// Returns the analysis timeout as a Duration.
    #[must_use]
    pub const fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }

    /// Returns the result store timeout as a Duration.
    #[must_use]
    pub const fn result_store_timeout(&self) -> Duration {
        Duration::from_secs(self.result_store_timeout_secs)
    }
}

/// Email API (Resend) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Base URL of the email API.
    pub api_url: String,
    /// API key. Email is disabled when unset or empty.
    pub api_key: Option<String>,
    /// Sender address.
    pub from: String,
    /// Public link placed in email call-to-action buttons.
    pub public_app_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.resend.com".to_string(),
            api_key: None,
            from: "Resume2Path <noreply@resume2path.vercel.app>".to_string(),
            public_app_url: "https://resume2path.vercel.app".to_string(),
            timeout_secs: 15,
        }
    }
}

impl EmailConfig {
    /// Returns true if an API key is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Returns the request timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log format (json, pretty).
    pub log_format: LogFormat,
    /// Enable Prometheus metrics and the `/metrics` endpoint.
    pub metrics_enabled: bool,
    /// Enable OTLP span export.
    pub tracing_enabled: bool,
    /// OTLP collector endpoint.
    pub otlp_endpoint: Option<String>,
    /// Trace sampling ratio (0.0 to 1.0).
    pub sampling_ratio: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            tracing_enabled: false,
            otlp_endpoint: None,
            sampling_ratio: 1.0,
        }
    }
}

impl ObservabilityConfig {
    /// Builds the telemetry settings for `resume_core::init_telemetry`.
    #[must_use]
    pub fn telemetry(&self, service_name: &str) -> TelemetryConfig {
        TelemetryConfig {
            enabled: self.tracing_enabled,
            service_name: service_name.to_string(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            sampling_ratio: self.sampling_ratio,
            log_format: self.log_format,
        }
    }
}
