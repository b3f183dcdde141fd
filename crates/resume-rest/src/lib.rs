//! # Resume REST
//!
//! REST API layer using Axum for the Resume2Path job queue.
//! Provides HTTP endpoints for enqueueing jobs, job lookup, queue statistics,
//! health checks and Prometheus metrics.

pub mod controllers;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
