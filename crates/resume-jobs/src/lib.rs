//! Resume2Path Jobs - background job queue
//!
//! Decouples the resume upload request from its follow-up work:
//! - `analysis` queue: LLM resume analysis (`analyze-resume`)
//! - `email` queue: welcome and results emails (`send-welcome-email`,
//!   `send-analysis-email`)
//!
//! Delivery is at-least-once. Jobs carry a priority (lower runs first), an
//! optional delay, and a retry policy with exponential backoff.
//!
//! # Architecture
//!
//! ```text
//!  Producer (QueueManager::enqueue)
//!     │
//!     ▼
//!  ┌──────────────────────── JobStore ────────────────────────┐
//!  │  analysis: delayed ─► wait ─► active ─► completed/failed │
//!  │  email:    delayed ─► wait ─► active ─► completed/failed │
//!  └───────────────▲──────────────┬───────────────────────────┘
//!                  │ retry        │ claim
//!                  │              ▼
//!            ┌─────┴──────────────────────┐      ┌──────────────┐
//!            │ WorkerPool (N loops)       │      │ StaleJob     │
//!            │  HandlerRegistry[JobKind]  │      │ Reaper       │
//!            └────────────────────────────┘      └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use resume_jobs::prelude::*;
//!
//! let manager = QueueManager::new(store, config.jobs.queues.clone());
//! manager
//!     .queue_welcome_email("ada@example.com", "Ada")
//!     .await
//!     .fire_and_forget("signup welcome email");
//! ```

pub mod clients;
pub mod error;
pub mod events;
pub mod handlers;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod reaper;
pub mod retry;
pub mod stats;
pub mod store;
pub mod templates;
pub mod worker;

pub use clients::{
    email_sender_from_config, AnalysisSink, Collaborators, DisabledEmailSender, EmailMessage,
    EmailReceipt, EmailSender, HttpAnalysisSink, HttpResumeAnalyzer, ResendEmailSender,
    ResumeAnalyzer,
};
pub use error::{JobError, JobResult};
pub use events::{spawn_event_logger, JobEvent};
pub use handlers::{HandlerRegistry, JobHandler};
pub use job::{
    AnalysisEmailPayload, AnalyzeResumePayload, Job, JobContext, JobHandle, JobId, JobPayload,
    JobState, WelcomeEmailPayload,
};
pub use manager::{FireAndForget, QueueManager};
pub use self::metrics::{register_metrics, JobMetrics, RedisMetrics, WorkerMetrics};
pub use queue::{JobKind, JobOptions, QueueName};
pub use reaper::{ReapSummary, StaleJobReaper};
pub use retry::Backoff;
pub use stats::{JobCounts, QueueStatsReport, StatsReporter};
pub use store::{create_pool, JobStore, MemoryJobStore, RedisJobStore, StaleRecovery};
pub use templates::EmailTemplates;
pub use worker::{ProcessOutcome, Worker, WorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used traits
pub mod prelude {
    pub use crate::handlers::JobHandler;
    pub use crate::manager::{FireAndForget, QueueManager};
    pub use crate::queue::{JobKind, JobOptions, QueueName};
    pub use crate::store::JobStore;
    pub use crate::{JobContext, JobError, JobId, JobPayload, JobResult};
}
