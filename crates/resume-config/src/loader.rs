//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use resume_core::ResumeError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "RESUME";

/// Configuration loaded from layered sources and validated.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. Built-in defaults
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` - Environment-specific overrides
    /// 4. `config/{role}.toml` - Deployment role overrides
    /// 5. `config/local.toml` - Uncommitted local overrides
    /// 6. Environment variables with `RESUME_` prefix, `__` between keys
    ///    (e.g. `RESUME_JOBS__WORKER__CONCURRENCY=8`)
    pub fn new(config_dir: impl Into<String>) -> Result<Self, ResumeError> {
        Self::with_env_prefix(config_dir, ENV_PREFIX)
    }

    /// Creates a loader reading environment overrides under a custom prefix.
    pub fn with_env_prefix(
        config_dir: impl Into<String>,
        env_prefix: impl Into<String>,
    ) -> Result<Self, ResumeError> {
        let config = Self::load_config(&config_dir.into(), &env_prefix.into())?;
        Ok(Self { config })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, ResumeError> {
        Self::new("./config")
    }

    /// Returns the loaded configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Consumes the loader, returning the configuration.
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str, env_prefix: &str) -> Result<AppConfig, ResumeError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var(format!("{env_prefix}_APP__ENVIRONMENT"))
            .unwrap_or_else(|_| "development".to_string());
        let role = std::env::var(format!("{env_prefix}_DEPLOYMENT__ROLE"))
            .unwrap_or_else(|_| "all".to_string());

        info!(
            "Loading configuration for environment: {}, role: {}",
            environment, role
        );

        let defaults = Config::try_from(&AppConfig::default()).map_err(config_error_to_resume_error)?;
        let mut builder = Config::builder().add_source(defaults);

        let layers = [
            ("default", "default".to_string()),
            ("environment", environment),
            ("role", role),
            ("local", "local".to_string()),
        ];
        for (label, name) in layers {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading {} config from: {}", label, path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_resume_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_resume_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration.
    pub fn validate_config(config: &AppConfig) -> Result<(), ResumeError> {
        if config.redis.url.trim().is_empty() {
            return Err(ResumeError::Configuration("Redis URL is required".to_string()));
        }

        if config.jobs.worker.concurrency == 0 {
            return Err(ResumeError::Configuration(
                "jobs.worker.concurrency must be at least 1".to_string(),
            ));
        }

        let worker = &config.jobs.worker;
        if worker.stale_after_secs <= worker.job_timeout_secs {
            return Err(ResumeError::Configuration(format!(
                "jobs.worker.stale_after_secs ({}) must exceed jobs.worker.job_timeout_secs ({})",
                worker.stale_after_secs, worker.job_timeout_secs
            )));
        }

        for (name, queue) in [
            ("analysis", &config.jobs.queues.analysis),
            ("email", &config.jobs.queues.email),
        ] {
            if queue.attempts == 0 {
                return Err(ResumeError::Configuration(format!(
                    "jobs.queues.{name}.attempts must be at least 1"
                )));
            }
        }

        if config.app.environment == "production" && !config.integrations.email.is_configured() {
            warn!("No email API key configured in production; emails will be skipped");
        }

        Ok(())
    }
}

fn config_error_to_resume_error(err: ConfigError) -> ResumeError {
    ResumeError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeploymentRole, ServerConfig};
    use std::fs;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.redis.key_prefix, "resume2path:jobs");
        assert_eq!(config.deployment.role, DeploymentRole::All);
        assert!(ConfigLoader::validate_config(&config).is_ok());
    }

    #[test]
    fn test_server_address() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_loads_defaults_from_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let loader =
            ConfigLoader::with_env_prefix(dir.path().to_string_lossy(), "RESUMETEST_EMPTY").unwrap();
        let config = loader.get().clone();
        assert_eq!(config.jobs.queues.analysis.backoff.delay_ms, 2000);
        assert_eq!(config.jobs.queues.email.remove_on_complete, 20);
    }

    #[test]
    fn test_file_layers_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[server]\nport = 9000\n\n[jobs.queues.analysis]\nattempts = 5\n",
        )
        .unwrap();
        fs::write(dir.path().join("local.toml"), "[server]\nport = 9100\n").unwrap();

        let loader =
            ConfigLoader::with_env_prefix(dir.path().to_string_lossy(), "RESUMETEST_FILES").unwrap();
        let config = loader.get().clone();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.jobs.queues.analysis.attempts, 5);
        // untouched keys in the same section keep their defaults
        assert_eq!(config.jobs.queues.analysis.remove_on_fail, 5);
    }

    #[test]
    fn test_env_overlay() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("RESUMETEST_ENV_JOBS__WORKER__CONCURRENCY", "12");
        std::env::set_var("RESUMETEST_ENV_REDIS__KEY_PREFIX", "staging:jobs");

        let loader =
            ConfigLoader::with_env_prefix(dir.path().to_string_lossy(), "RESUMETEST_ENV").unwrap();
        let config = loader.get().clone();
        assert_eq!(config.jobs.worker.concurrency, 12);
        assert_eq!(config.redis.key_prefix, "staging:jobs");

        std::env::remove_var("RESUMETEST_ENV_JOBS__WORKER__CONCURRENCY");
        std::env::remove_var("RESUMETEST_ENV_REDIS__KEY_PREFIX");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[jobs.queues.email]\nattempts = 0\n",
        )
        .unwrap();

        let result = ConfigLoader::with_env_prefix(dir.path().to_string_lossy(), "RESUMETEST_ZERO");
        assert!(matches!(result, Err(ResumeError::Configuration(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.jobs.worker.concurrency = 0;
        assert!(ConfigLoader::validate_config(&config).is_err());
    }

    #[test]
    fn test_stale_window_must_exceed_job_timeout() {
        let mut config = AppConfig::default();
        config.jobs.worker.job_timeout_secs = 300;
        config.jobs.worker.stale_after_secs = 300;
        assert!(matches!(
            ConfigLoader::validate_config(&config),
            Err(ResumeError::Configuration(_))
        ));

        config.jobs.worker.stale_after_secs = 120;
        assert!(ConfigLoader::validate_config(&config).is_err());

        config.jobs.worker.stale_after_secs = 301;
        assert!(ConfigLoader::validate_config(&config).is_ok());
    }

    #[test]
    fn test_stale_window_checked_on_load() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "[jobs.worker]\njob_timeout_secs = 600\nstale_after_secs = 300\n",
        )
        .unwrap();

        let result =
            ConfigLoader::with_env_prefix(dir.path().to_string_lossy(), "RESUMETEST_STALE");
        assert!(matches!(result, Err(ResumeError::Configuration(_))));
    }

    #[test]
    fn test_empty_redis_url_rejected() {
        let mut config = AppConfig::default();
        config.redis.url = String::new();
        assert!(ConfigLoader::validate_config(&config).is_err());
    }
}
