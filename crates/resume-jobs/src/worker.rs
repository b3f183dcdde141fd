//! Worker pool for processing jobs.

use crate::error::{JobError, JobResult};
use crate::events::JobEvent;
use crate::handlers::HandlerRegistry;
use crate::job::{Job, JobContext, JobId};
use crate::manager::QueueManager;
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::queue::QueueName;
use chrono::Utc;
use parking_lot::Mutex;
use resume_config::WorkerConfig;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent worker loops.
    pub concurrency: usize,

    /// Queues to process, polled in order.
    pub queues: Vec<QueueName>,

    /// Job execution timeout.
    pub job_timeout: Duration,

    /// Sleep between polls when every queue was empty.
    pub poll_interval: Duration,

    /// How long shutdown waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            queues: QueueName::ALL.to_vec(),
            job_timeout: config.job_timeout(),
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Result of one claim-and-execute step.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing was due on the queue.
    Idle,
    /// The job completed.
    Completed(JobId),
    /// The attempt failed and the job was rescheduled.
    Retrying { job_id: JobId, delay: Duration },
    /// The job failed permanently.
    Failed { job_id: JobId, error: String },
}

impl ProcessOutcome {
    /// Returns true if a job was claimed.
    pub fn did_work(&self) -> bool {
        !matches!(self, ProcessOutcome::Idle)
    }
}

/// Claims jobs and runs their handlers.
#[derive(Clone)]
pub struct Worker {
    id: String,
    manager: QueueManager,
    registry: Arc<HandlerRegistry>,
    job_timeout: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        manager: QueueManager,
        registry: Arc<HandlerRegistry>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            manager,
            registry,
            job_timeout,
        }
    }

    /// Worker ID recorded on claimed jobs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claims the next due job of `queue`, runs it and records the outcome.
    pub async fn process_next(&self, queue: QueueName) -> JobResult<ProcessOutcome> {
        let now = Utc::now();
        let Some(job) = self.manager.store().claim(queue, &self.id, now).await? else {
            return Ok(ProcessOutcome::Idle);
        };

        let wait = (now - job.delay_until).to_std().unwrap_or_default();
        JobMetrics::job_dequeued(queue.as_str(), job.job_type.as_str(), wait);

        let span = tracing::info_span!(
            "job",
            job_id = %job.id,
            queue = %queue,
            job_type = %job.job_type,
            attempt = job.attempts,
            worker_id = %self.id,
        );
        self.execute(job).instrument(span).await
    }

    async fn execute(&self, job: Job) -> JobResult<ProcessOutcome> {
        debug!("Processing job");
        let started = Instant::now();

        match self.run_handler(&job).await {
            Ok(result) => self.complete(&job, result, started.elapsed()).await,
            Err(e) => self.handle_failure(&job, e, started.elapsed()).await,
        }
    }

    async fn run_handler(&self, job: &Job) -> JobResult<Value> {
        let payload = job.typed_payload()?;
        let handler = self
            .registry
            .get(job.job_type)
            .ok_or_else(|| JobError::UnknownJobType(job.job_type.to_string()))?;
        let ctx = JobContext::new(job, &self.id, self.manager.clone());

        match timeout(self.job_timeout, handler.handle(payload, &ctx)).await {
            Ok(result) => result,
            Err(_) => {
                JobMetrics::job_timed_out(job.queue_name.as_str(), job.job_type.as_str());
                Err(JobError::Timeout(self.job_timeout.as_secs()))
            }
        }
    }

    async fn complete(
        &self,
        job: &Job,
        result: Value,
        elapsed: Duration,
    ) -> JobResult<ProcessOutcome> {
        let retain = self.manager.settings(job.queue_name).remove_on_complete;
        let done = self
            .manager
            .store()
            .complete(&job.id, &self.id, Some(result), retain)
            .await?;

        JobMetrics::job_completed(job.queue_name.as_str(), job.job_type.as_str(), elapsed);
        self.manager.emit(JobEvent::Completed {
            job_id: done.id.clone(),
            queue: done.queue_name,
            job_type: done.job_type,
            attempts: done.attempts,
        });

        Ok(ProcessOutcome::Completed(done.id))
    }

    async fn handle_failure(
        &self,
        job: &Job,
        err: JobError,
        elapsed: Duration,
    ) -> JobResult<ProcessOutcome> {
        let message = err.to_string();
        let queue = job.queue_name;

        if err.is_retryable() && !job.is_exhausted() {
            let delay = job.backoff.delay_for_attempt(job.attempts);
            let run_at = Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
            self.manager
                .store()
                .retry(&job.id, &self.id, &message, run_at)
                .await?;

            warn!(
                error = %message,
                delay_ms = delay.as_millis() as u64,
                remaining = job.max_attempts - job.attempts,
                "Job attempt failed, retrying"
            );
            JobMetrics::job_retried(queue.as_str(), job.job_type.as_str(), job.attempts);
            self.manager.emit(JobEvent::Retrying {
                job_id: job.id.clone(),
                queue,
                job_type: job.job_type,
                attempt: job.attempts,
                delay_ms: delay.as_millis() as u64,
                error: message,
            });

            return Ok(ProcessOutcome::Retrying {
                job_id: job.id.clone(),
                delay,
            });
        }

        let retain = self.manager.settings(queue).remove_on_fail;
        let failed = self
            .manager
            .store()
            .fail(&job.id, &self.id, &message, retain)
            .await?;

        JobMetrics::job_failed(queue.as_str(), job.job_type.as_str(), err.kind(), elapsed);
        self.manager.emit(JobEvent::Failed {
            job_id: failed.id.clone(),
            queue,
            job_type: failed.job_type,
            attempts: failed.attempts,
            error: message.clone(),
        });

        Ok(ProcessOutcome::Failed {
            job_id: failed.id,
            error: message,
        })
    }
}

/// Worker pool statistics.
#[derive(Debug, Clone)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Worker loops currently alive.
    pub active_workers: usize,

    /// Jobs completed.
    pub jobs_completed: u64,

    /// Attempts that were rescheduled.
    pub jobs_retried: u64,

    /// Jobs failed permanently.
    pub jobs_failed: u64,

    /// Queues being processed.
    pub queues: Vec<QueueName>,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    active_workers: AtomicUsize,
}

impl Counters {
    fn record(&self, outcome: &ProcessOutcome) {
        let counter = match outcome {
            ProcessOutcome::Idle => return,
            ProcessOutcome::Completed(_) => &self.completed,
            ProcessOutcome::Retrying { .. } => &self.retried,
            ProcessOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs `concurrency` worker loops over the configured queues.
pub struct WorkerPool {
    /// Unique pool ID.
    id: String,

    manager: QueueManager,
    registry: Arc<HandlerRegistry>,
    config: WorkerPoolConfig,

    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,

    /// Running flag.
    running: Arc<AtomicBool>,

    counters: Arc<Counters>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool.
    pub fn new(
        manager: QueueManager,
        registry: Arc<HandlerRegistry>,
        config: WorkerPoolConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            id: format!("worker-pool-{}", Uuid::new_v4()),
            manager,
            registry,
            config,
            shutdown_tx,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker loops.
    pub fn start(&self) -> JobResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Internal("Worker pool already running".to_string()));
        }

        info!(
            pool_id = %self.id,
            concurrency = self.config.concurrency,
            queues = ?self.config.queues,
            "Starting worker pool"
        );

        let mut handles = self.handles.lock();
        for index in 0..self.config.concurrency {
            let worker = Worker::new(
                format!("{}-{}", self.id, index),
                self.manager.clone(),
                self.registry.clone(),
                self.config.job_timeout,
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            let span = tracing::info_span!("worker", worker_id = %worker.id());

            handles.push(tokio::spawn(
                run_loop(
                    worker,
                    self.config.queues.clone(),
                    self.config.poll_interval,
                    shutdown_rx,
                    self.counters.clone(),
                    self.id.clone(),
                )
                .instrument(span),
            ));
        }

        Ok(())
    }

    /// Signals the loops to stop and waits for in-flight jobs, up to the
    /// shutdown timeout. Loops still running after that are aborted.
    pub async fn shutdown(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        info!(pool_id = %self.id, "Stopping worker pool...");
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        let joined = timeout(self.config.shutdown_timeout, futures::future::join_all(handles)).await;
        if joined.is_err() {
            warn!(
                pool_id = %self.id,
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "Workers did not stop in time, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        self.running.store(false, Ordering::SeqCst);

        let stats = self.stats();
        info!(
            pool_id = %self.id,
            completed = stats.jobs_completed,
            retried = stats.jobs_retried,
            failed = stats.jobs_failed,
            "Worker pool stopped"
        );
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.id.clone(),
            running: self.is_running(),
            concurrency: self.config.concurrency,
            active_workers: self.counters.active_workers.load(Ordering::Relaxed),
            jobs_completed: self.counters.completed.load(Ordering::Relaxed),
            jobs_retried: self.counters.retried.load(Ordering::Relaxed),
            jobs_failed: self.counters.failed.load(Ordering::Relaxed),
            queues: self.config.queues.clone(),
        }
    }
}

async fn run_loop(
    worker: Worker,
    queues: Vec<QueueName>,
    poll_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
    counters: Arc<Counters>,
    pool_id: String,
) {
    let active = counters.active_workers.fetch_add(1, Ordering::Relaxed) + 1;
    WorkerMetrics::update_workers(&pool_id, active);
    debug!("Worker started");

    loop {
        // Finish the current job before honoring shutdown
        if !matches!(
            shutdown_rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ) {
            break;
        }

        let mut did_work = false;
        for queue in &queues {
            match worker.process_next(*queue).await {
                Ok(outcome) => {
                    did_work |= outcome.did_work();
                    counters.record(&outcome);
                }
                Err(e @ JobError::InvalidState { .. }) => {
                    // The reaper reclaimed the job first
                    warn!(queue = %queue, error = %e, "Job was reclaimed while running");
                    did_work = true;
                }
                Err(e) => {
                    error!(queue = %queue, error = %e, "Failed to process job");
                }
            }
        }

        if !did_work {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    let active = counters.active_workers.fetch_sub(1, Ordering::Relaxed) - 1;
    WorkerMetrics::update_workers(&pool_id, active);
    debug!("Worker stopped");
}
