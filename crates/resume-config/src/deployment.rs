//! Deployment role configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which parts of the system a process runs.
///
/// A single process can serve the API and run workers, or the two can be
/// split so that worker processes scale independently against the same store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentRole {
    /// HTTP API and workers in one process.
    #[default]
    All,
    /// HTTP API only (producers and stats).
    Api,
    /// Workers and the stale-job reaper only.
    Worker,
}

impl DeploymentRole {
    /// Returns true if this role serves the HTTP API.
    #[must_use]
    pub const fn serves_api(&self) -> bool {
        matches!(self, Self::All | Self::Api)
    }

    /// Returns true if this role runs job workers.
    #[must_use]
    pub const fn runs_workers(&self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }
}

impl fmt::Display for DeploymentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Api => write!(f, "api"),
            Self::Worker => write!(f, "worker"),
        }
    }
}
