//! Job handlers and their registry.

mod analysis;
mod email;

pub use analysis::AnalyzeResumeHandler;
pub use email::{AnalysisEmailHandler, WelcomeEmailHandler};

use crate::clients::Collaborators;
use crate::error::JobResult;
use crate::job::{JobContext, JobPayload};
use crate::queue::JobKind;
use crate::templates::EmailTemplates;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Runs one kind of job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler serves.
    fn kind(&self) -> JobKind;

    /// Executes one attempt. The returned value is stored as the job result.
    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<Value>;
}

/// Handlers keyed by job kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every job kind.
    pub fn with_defaults(collaborators: Collaborators, templates: EmailTemplates) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AnalyzeResumeHandler::new(
            collaborators.analyzer.clone(),
            collaborators.sink.clone(),
        )));
        registry.register(Arc::new(WelcomeEmailHandler::new(
            collaborators.email.clone(),
            templates.clone(),
        )));
        registry.register(Arc::new(AnalysisEmailHandler::new(
            collaborators.email,
            templates,
        )));
        registry
    }

    /// Registers a handler, replacing any previous one for the same kind.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let kind = handler.kind();
        self.handlers.insert(kind, handler);
        info!(job_type = %kind, "Registered job handler");
    }

    /// Handler for `kind`.
    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<JobKind> {
        self.handlers.keys().copied().collect()
    }
}
