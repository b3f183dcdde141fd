//! Job persistence.
//!
//! A store keeps every job record and the per-queue state indexes. Every
//! write to an active job names the worker making it, and the store rejects
//! it with `InvalidState` unless that worker still holds the job. Once the
//! reaper reclaims a job, its previous holder can no longer touch it.

mod memory;
mod redis;

pub use self::memory::MemoryJobStore;
pub use self::redis::{create_pool, RedisJobStore, RedisKeys};

use crate::error::JobResult;
use crate::job::{Job, JobId};
use crate::queue::QueueName;
use crate::stats::JobCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Outcome for one job reclaimed from a stalled worker.
#[derive(Debug, Clone, PartialEq)]
pub enum StaleRecovery {
    /// Attempts remained; the job is waiting again.
    Requeued(Job),
    /// Attempts were exhausted; the job failed.
    Failed(Job),
}

impl StaleRecovery {
    /// The reclaimed job.
    pub fn job(&self) -> &Job {
        match self {
            StaleRecovery::Requeued(job) | StaleRecovery::Failed(job) => job,
        }
    }
}

/// Durable job storage.
///
/// Retention arguments keep the newest `retain` finished jobs of a queue;
/// `0` keeps all of them.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Stores a new waiting job.
    async fn push(&self, job: &Job) -> JobResult<()>;

    /// Claims the next due job of `queue`: lowest priority first, FIFO within
    /// a priority. The returned job is already `active`.
    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>>;

    /// Records handler progress on a job held by `worker_id`.
    async fn update_progress(&self, id: &JobId, worker_id: &str, progress: u8) -> JobResult<()>;

    /// active -> completed
    async fn complete(
        &self,
        id: &JobId,
        worker_id: &str,
        result: Option<Value>,
        retain: usize,
    ) -> JobResult<Job>;

    /// active -> waiting, due at `run_at`
    async fn retry(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> JobResult<Job>;

    /// active -> failed
    async fn fail(&self, id: &JobId, worker_id: &str, error: &str, retain: usize)
        -> JobResult<Job>;

    /// Looks up a job by ID.
    async fn get(&self, id: &JobId) -> JobResult<Option<Job>>;

    /// Counts jobs per state on `queue`.
    async fn counts(&self, queue: QueueName) -> JobResult<JobCounts>;

    /// Reclaims active jobs whose attempt started before `stalled_before`.
    async fn recover_stale(
        &self,
        queue: QueueName,
        stalled_before: DateTime<Utc>,
        retain_failed: usize,
    ) -> JobResult<Vec<StaleRecovery>>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> JobResult<()>;
}
