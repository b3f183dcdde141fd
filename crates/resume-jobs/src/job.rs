//! Job records, payloads and execution context.

use crate::error::{JobError, JobResult};
use crate::events::JobEvent;
use crate::manager::QueueManager;
use crate::queue::{JobKind, JobOptions, QueueName};
use crate::retry::Backoff;
use chrono::{DateTime, Utc};
use resume_config::QueueSettings;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Error recorded on jobs reclaimed from a crashed worker.
pub const STALLED_ERROR: &str = "job stalled";

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready, or delayed until `delay_until`.
    #[default]
    Waiting,
    /// Claimed by a worker.
    Active,
    /// Finished successfully.
    Completed,
    /// Failed permanently.
    Failed,
}

impl JobState {
    /// Returns true for `completed` and `failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Wire name of the state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `analyze-resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResumePayload {
    pub resume_id: i64,
    pub file_url: String,
    pub text_content: String,
    pub target_role: String,
    pub email: String,
    pub name: String,
}

/// Payload of `send-welcome-email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEmailPayload {
    pub email: String,
    pub name: String,
}

/// Payload of `send-analysis-email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisEmailPayload {
    pub email: String,
    pub name: String,
    pub analysis_result: Value,
    pub file_name: String,
    pub target_role: String,
}

/// Typed payload, one variant per job kind.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    AnalyzeResume(AnalyzeResumePayload),
    WelcomeEmail(WelcomeEmailPayload),
    AnalysisEmail(AnalysisEmailPayload),
}

impl JobPayload {
    /// The job kind this payload belongs to.
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::AnalyzeResume(_) => JobKind::AnalyzeResume,
            JobPayload::WelcomeEmail(_) => JobKind::SendWelcomeEmail,
            JobPayload::AnalysisEmail(_) => JobKind::SendAnalysisEmail,
        }
    }

    /// Builds a payload from its wire form.
    pub fn from_parts(kind: JobKind, payload: Value) -> JobResult<Self> {
        match kind {
            JobKind::AnalyzeResume => decode(kind, payload).map(JobPayload::AnalyzeResume),
            JobKind::SendWelcomeEmail => decode(kind, payload).map(JobPayload::WelcomeEmail),
            JobKind::SendAnalysisEmail => decode(kind, payload).map(JobPayload::AnalysisEmail),
        }
    }

    /// Serializes the payload body, without the kind tag.
    pub fn to_value(&self) -> JobResult<Value> {
        let value = match self {
            JobPayload::AnalyzeResume(p) => serde_json::to_value(p)?,
            JobPayload::WelcomeEmail(p) => serde_json::to_value(p)?,
            JobPayload::AnalysisEmail(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }
}

fn decode<T: DeserializeOwned>(kind: JobKind, payload: Value) -> JobResult<T> {
    serde_json::from_value(payload).map_err(|e| JobError::PayloadMismatch(format!("{}: {}", kind, e)))
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Job ID.
    pub id: JobId,

    /// Queue the job lives on.
    pub queue_name: QueueName,

    /// Handler selector.
    pub job_type: JobKind,

    /// Payload body for `job_type`.
    pub payload: Value,

    /// Lower runs first.
    pub priority: u32,

    /// Not claimable before this instant.
    pub delay_until: DateTime<Utc>,

    /// Number of times the job has been claimed.
    pub attempts: u32,

    /// Attempts allowed before the job fails permanently.
    pub max_attempts: u32,

    /// Delay policy between attempts.
    pub backoff: Backoff,

    /// Current state.
    pub state: JobState,

    /// Handler-reported progress, 0 to 100.
    pub progress: u8,

    /// Handler result once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error from the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,

    /// When the current or last attempt was claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Worker holding (or last holding) the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl Job {
    /// Creates a waiting job from a payload, its options and the queue defaults.
    pub fn new(
        payload: &JobPayload,
        options: &JobOptions,
        settings: &QueueSettings,
        now: DateTime<Utc>,
    ) -> JobResult<Self> {
        options.validate()?;

        let delay = chrono::Duration::from_std(options.delay_value())
            .map_err(|e| JobError::Validation(format!("delay out of range: {}", e)))?;
        let kind = payload.kind();

        Ok(Self {
            id: JobId::new(),
            queue_name: kind.queue(),
            job_type: kind,
            payload: payload.to_value()?,
            priority: options.priority_value(),
            delay_until: now + delay,
            attempts: 0,
            max_attempts: options.max_attempts_override().unwrap_or(settings.attempts),
            backoff: options
                .backoff_override()
                .unwrap_or_else(|| Backoff::from(&settings.backoff)),
            state: JobState::Waiting,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            worker_id: None,
        })
    }

    /// Decodes the typed payload.
    pub fn typed_payload(&self) -> JobResult<JobPayload> {
        JobPayload::from_parts(self.job_type, self.payload.clone())
    }

    /// Returns true if the job is waiting but not yet due.
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.delay_until > now
    }

    /// Check if max attempts reached.
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Fails with `InvalidState` unless the job is active.
    pub fn ensure_active(&self) -> JobResult<()> {
        if self.state == JobState::Active {
            Ok(())
        } else {
            Err(JobError::InvalidState {
                expected: JobState::Active.to_string(),
                actual: self.state.to_string(),
            })
        }
    }

    /// Fails with `InvalidState` unless the job is active and held by
    /// `worker_id`.
    pub fn ensure_held_by(&self, worker_id: &str) -> JobResult<()> {
        self.ensure_active()?;
        match self.worker_id.as_deref() {
            Some(holder) if holder == worker_id => Ok(()),
            holder => Err(JobError::InvalidState {
                expected: format!("active on {}", worker_id),
                actual: format!("active on {}", holder.unwrap_or("no worker")),
            }),
        }
    }

    /// waiting -> active
    pub fn mark_active(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts += 1;
        self.started_at = Some(now);
        self.worker_id = Some(worker_id.to_string());
    }

    /// active -> completed
    pub fn mark_completed(&mut self, result: Option<Value>, now: DateTime<Utc>) {
        self.state = JobState::Completed;
        self.result = result;
        self.finished_at = Some(now);
    }

    /// active -> waiting, due at `run_at`
    pub fn mark_retrying(&mut self, error: &str, run_at: DateTime<Utc>) {
        self.state = JobState::Waiting;
        self.error = Some(error.to_string());
        self.delay_until = run_at;
        self.worker_id = None;
    }

    /// active -> failed
    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.state = JobState::Failed;
        self.error = Some(error.to_string());
        self.finished_at = Some(now);
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Returned to producers after a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: JobId,
    pub queue_name: QueueName,
    pub job_type: JobKind,
    pub delay_until: DateTime<Utc>,
}

impl From<&Job> for JobHandle {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            queue_name: job.queue_name,
            job_type: job.job_type,
            delay_until: job.delay_until,
        }
    }
}

/// Execution context handed to a handler for one attempt.
#[derive(Clone)]
pub struct JobContext {
    job_id: JobId,
    queue: QueueName,
    kind: JobKind,
    attempt: u32,
    worker_id: String,
    manager: QueueManager,
}

impl JobContext {
    /// Creates the context for a claimed job.
    pub fn new(job: &Job, worker_id: &str, manager: QueueManager) -> Self {
        Self {
            job_id: job.id.clone(),
            queue: job.queue_name,
            kind: job.job_type,
            attempt: job.attempts,
            worker_id: worker_id.to_string(),
            manager,
        }
    }

    /// Job ID.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Job kind.
    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Current attempt number (1-based).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Producer access for follow-up jobs.
    pub fn manager(&self) -> &QueueManager {
        &self.manager
    }

    /// Records progress on the job. Advisory: failures are logged, never raised.
    pub async fn progress(&self, value: u8) {
        let value = value.min(100);
        match self
            .manager
            .store()
            .update_progress(&self.job_id, &self.worker_id, value)
            .await
        {
            Ok(()) => {
                debug!(job_id = %self.job_id, progress = value, "Job progress");
                self.manager.emit(JobEvent::Progress {
                    job_id: self.job_id.clone(),
                    queue: self.queue,
                    progress: value,
                });
            }
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Failed to record job progress");
            }
        }
    }
}
