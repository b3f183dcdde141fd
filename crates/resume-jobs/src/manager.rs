//! Producer API.

use crate::error::{JobError, JobResult};
use crate::events::{event_channel, JobEvent};
use crate::job::{
    AnalysisEmailPayload, AnalyzeResumePayload, Job, JobHandle, JobId, JobPayload,
    WelcomeEmailPayload,
};
use crate::metrics::JobMetrics;
use crate::queue::{JobOptions, QueueName};
use crate::store::JobStore;
use chrono::Utc;
use resume_config::{QueueSettings, QueuesConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Enqueues jobs and gives workers access to the store, queue settings and
/// event channel.
#[derive(Clone)]
pub struct QueueManager {
    store: Arc<dyn JobStore>,
    queues: Arc<QueuesConfig>,
    events: broadcast::Sender<JobEvent>,
}

impl QueueManager {
    /// Create a manager over a store.
    pub fn new(store: Arc<dyn JobStore>, queues: QueuesConfig) -> Self {
        Self {
            store,
            queues: Arc::new(queues),
            events: event_channel(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Retry and retention settings of a queue.
    pub fn settings(&self, queue: QueueName) -> &QueueSettings {
        match queue {
            QueueName::Analysis => &self.queues.analysis,
            QueueName::Email => &self.queues.email,
        }
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: JobEvent) {
        let _ = self.events.send(event);
    }

    /// Persists a new job on `queue`.
    ///
    /// The job is stored before this returns, and becomes claimable once its
    /// delay has passed.
    pub async fn enqueue(
        &self,
        queue: QueueName,
        payload: JobPayload,
        options: JobOptions,
    ) -> JobResult<JobHandle> {
        let kind = payload.kind();
        if kind.queue() != queue {
            return Err(JobError::QueueMismatch {
                queue: queue.to_string(),
                job_type: kind.to_string(),
            });
        }

        let job = Job::new(&payload, &options, self.settings(queue), Utc::now())?;
        self.store.push(&job).await?;

        JobMetrics::job_enqueued(queue.as_str(), kind.as_str());
        self.emit(JobEvent::Enqueued {
            job_id: job.id.clone(),
            queue,
            job_type: kind,
        });

        debug!(
            job_id = %job.id,
            queue = %queue,
            job_type = %kind,
            priority = job.priority,
            "Job enqueued"
        );

        Ok(JobHandle::from(&job))
    }

    async fn enqueue_with_defaults(&self, payload: JobPayload) -> JobResult<JobHandle> {
        let kind = payload.kind();
        self.enqueue(kind.queue(), payload, kind.default_options())
            .await
    }

    /// Queue an `analyze-resume` job.
    pub async fn queue_resume_analysis(
        &self,
        payload: AnalyzeResumePayload,
    ) -> JobResult<JobHandle> {
        let resume_id = payload.resume_id;
        let handle = self
            .enqueue_with_defaults(JobPayload::AnalyzeResume(payload))
            .await?;
        info!(job_id = %handle.id, resume_id, "Resume analysis queued");
        Ok(handle)
    }

    /// Queue a `send-welcome-email` job.
    pub async fn queue_welcome_email(
        &self,
        email: impl Into<String>,
        name: impl Into<String>,
    ) -> JobResult<JobHandle> {
        let payload = WelcomeEmailPayload {
            email: email.into(),
            name: name.into(),
        };
        let handle = self
            .enqueue_with_defaults(JobPayload::WelcomeEmail(payload))
            .await?;
        info!(job_id = %handle.id, "Welcome email queued");
        Ok(handle)
    }

    /// Queue a `send-analysis-email` job.
    pub async fn queue_analysis_email(
        &self,
        payload: AnalysisEmailPayload,
    ) -> JobResult<JobHandle> {
        let handle = self
            .enqueue_with_defaults(JobPayload::AnalysisEmail(payload))
            .await?;
        info!(job_id = %handle.id, "Analysis email queued");
        Ok(handle)
    }

    /// Looks up a job by ID.
    pub async fn get_job(&self, id: &JobId) -> JobResult<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

/// Explicitly discards a failed enqueue.
///
/// Queue failures must never fail the caller's primary action; this makes
/// the discard visible at the call site and in the logs.
pub trait FireAndForget<T> {
    /// Returns the value, or logs the error at `warn` and returns `None`.
    fn fire_and_forget(self, context: &str) -> Option<T>;
}

impl<T> FireAndForget<T> for JobResult<T> {
    fn fire_and_forget(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(context = %context, error = %e, "Enqueue failed, continuing");
                JobMetrics::enqueue_discarded(context);
                None
            }
        }
    }
}
