//! # Resume2Path Server Library
//!
//! Wires configuration, the job store, the worker pool and the HTTP API
//! into one process. The deployment role decides which parts run.

pub mod app;
pub mod startup;
