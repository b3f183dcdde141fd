//! # Resume Core
//!
//! Shared error types, result aliases, and logging/telemetry bootstrap for
//! the Resume2Path job queue workspace.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
