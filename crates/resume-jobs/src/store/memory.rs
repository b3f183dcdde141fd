//! In-process job store.

use super::{JobStore, StaleRecovery};
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobState};
use crate::queue::QueueName;
use crate::stats::JobCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

struct Stored {
    job: Job,
    // Enqueue order within a priority; reassigned on retry.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Stored>,
    next_seq: u64,
    // Finished job IDs per queue and terminal state, oldest first.
    finished: HashMap<(QueueName, JobState), VecDeque<JobId>>,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn held_mut(&mut self, id: &JobId, worker_id: &str) -> JobResult<&mut Job> {
        let stored = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        stored.job.ensure_held_by(worker_id)?;
        Ok(&mut stored.job)
    }

    fn finish(&mut self, queue: QueueName, state: JobState, id: JobId, retain: usize) {
        let ids = self.finished.entry((queue, state)).or_default();
        ids.push_back(id);

        if retain == 0 {
            return;
        }
        let mut evicted = Vec::new();
        while ids.len() > retain {
            if let Some(old) = ids.pop_front() {
                evicted.push(old);
            }
        }
        for old in evicted {
            self.jobs.remove(&old);
        }
    }
}

/// Job store held in process memory.
///
/// Jobs are lost on restart; used for tests and single-process development.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of job records currently held, including finished ones.
    pub fn len(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    /// Returns true if no job records are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn push(&self, job: &Job) -> JobResult<()> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();
        inner.jobs.insert(
            job.id.clone(),
            Stored {
                job: job.clone(),
                seq,
            },
        );
        Ok(())
    }

    async fn claim(
        &self,
        queue: QueueName,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        let mut inner = self.inner.lock();

        let next = inner
            .jobs
            .iter()
            .filter(|(_, s)| {
                s.job.queue_name == queue
                    && s.job.state == JobState::Waiting
                    && s.job.delay_until <= now
            })
            .min_by_key(|(_, s)| (s.job.priority, s.seq))
            .map(|(id, _)| id.clone());

        let Some(id) = next else {
            return Ok(None);
        };

        match inner.jobs.get_mut(&id) {
            Some(stored) => {
                stored.job.mark_active(worker_id, now);
                Ok(Some(stored.job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_progress(&self, id: &JobId, worker_id: &str, progress: u8) -> JobResult<()> {
        let mut inner = self.inner.lock();
        let job = inner.held_mut(id, worker_id)?;
        job.progress = progress;
        Ok(())
    }

    async fn complete(
        &self,
        id: &JobId,
        worker_id: &str,
        result: Option<Value>,
        retain: usize,
    ) -> JobResult<Job> {
        let mut inner = self.inner.lock();
        let job = inner.held_mut(id, worker_id)?;
        job.mark_completed(result, Utc::now());
        let job = job.clone();

        inner.finish(job.queue_name, JobState::Completed, job.id.clone(), retain);
        Ok(job)
    }

    async fn retry(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> JobResult<Job> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq();
        let job = inner.held_mut(id, worker_id)?;
        job.mark_retrying(error, run_at);
        let job = job.clone();

        if let Some(stored) = inner.jobs.get_mut(id) {
            stored.seq = seq;
        }
        Ok(job)
    }

    async fn fail(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        retain: usize,
    ) -> JobResult<Job> {
        let mut inner = self.inner.lock();
        let job = inner.held_mut(id, worker_id)?;
        job.mark_failed(error, Utc::now());
        let job = job.clone();

        inner.finish(job.queue_name, JobState::Failed, job.id.clone(), retain);
        Ok(job)
    }

    async fn get(&self, id: &JobId) -> JobResult<Option<Job>> {
        Ok(self.inner.lock().jobs.get(id).map(|s| s.job.clone()))
    }

    async fn counts(&self, queue: QueueName) -> JobResult<JobCounts> {
        let inner = self.inner.lock();
        let mut counts = JobCounts::default();

        for stored in inner.jobs.values().filter(|s| s.job.queue_name == queue) {
            match stored.job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn recover_stale(
        &self,
        queue: QueueName,
        stalled_before: DateTime<Utc>,
        retain_failed: usize,
    ) -> JobResult<Vec<StaleRecovery>> {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        let stale: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|s| {
                s.job.queue_name == queue
                    && s.job.state == JobState::Active
                    && s.job.started_at.is_some_and(|t| t < stalled_before)
            })
            .map(|s| s.job.id.clone())
            .collect();

        let mut recovered = Vec::with_capacity(stale.len());
        for id in stale {
            let seq = inner.next_seq();
            let Some(stored) = inner.jobs.get_mut(&id) else {
                continue;
            };

            if stored.job.is_exhausted() {
                stored.job.mark_failed(crate::job::STALLED_ERROR, now);
                let job = stored.job.clone();
                inner.finish(queue, JobState::Failed, id, retain_failed);
                recovered.push(StaleRecovery::Failed(job));
            } else {
                stored.job.mark_retrying(crate::job::STALLED_ERROR, now);
                stored.seq = seq;
                recovered.push(StaleRecovery::Requeued(stored.job.clone()));
            }
        }

        Ok(recovered)
    }

    async fn ping(&self) -> JobResult<()> {
        Ok(())
    }
}
