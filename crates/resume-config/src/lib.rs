//! # Resume Config
//!
//! Configuration management for the Resume2Path job queue.
//! Supports layered configuration from files, environment variables,
//! and runtime refresh.

mod app_config;
mod deployment;
mod loader;

pub use app_config::*;
pub use deployment::*;
pub use loader::*;
