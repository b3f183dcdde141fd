//! Prometheus metrics for job queue monitoring.

use crate::stats::JobCounts;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue system.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "resume_jobs_enqueued_total";
    /// Total jobs claimed by a worker.
    pub const JOBS_DEQUEUED_TOTAL: &str = "resume_jobs_dequeued_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "resume_jobs_completed_total";
    /// Total jobs failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "resume_jobs_failed_total";
    /// Total retries scheduled.
    pub const JOBS_RETRIED_TOTAL: &str = "resume_jobs_retried_total";
    /// Total handler runs that hit the job timeout.
    pub const JOBS_TIMED_OUT_TOTAL: &str = "resume_jobs_timed_out_total";
    /// Total jobs reclaimed from stalled workers.
    pub const JOBS_STALLED_TOTAL: &str = "resume_jobs_stalled_total";
    /// Total enqueue attempts that were discarded after a failure.
    pub const ENQUEUE_DISCARDED_TOTAL: &str = "resume_jobs_enqueue_discarded_total";

    /// Jobs per queue and state.
    pub const JOBS_STATE: &str = "resume_jobs_state";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "resume_jobs_duration_seconds";
    /// Time between a job becoming due and being claimed, in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "resume_jobs_wait_time_seconds";

    /// Running worker loops.
    pub const WORKERS_ACTIVE: &str = "resume_jobs_workers_active";

    /// Redis operation duration in seconds.
    pub const REDIS_OPERATION_DURATION: &str = "resume_jobs_redis_operation_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_DEQUEUED_TOTAL,
        "Total number of jobs claimed for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed permanently"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(
        names::JOBS_TIMED_OUT_TOTAL,
        "Total number of handler runs that timed out"
    );
    describe_counter!(
        names::JOBS_STALLED_TOTAL,
        "Total number of jobs reclaimed from stalled workers"
    );
    describe_counter!(
        names::ENQUEUE_DISCARDED_TOTAL,
        "Total number of failed enqueues that were ignored by the caller"
    );

    describe_gauge!(names::JOBS_STATE, "Current number of jobs per queue and state");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job execution duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time from due to claimed in seconds"
    );

    describe_gauge!(names::WORKERS_ACTIVE, "Number of running worker loops");

    describe_histogram!(
        names::REDIS_OPERATION_DURATION,
        "Redis operation duration in seconds"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(queue: &str, job_type: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a job claimed.
    pub fn job_dequeued(queue: &str, job_type: &str, wait_time: Duration) {
        counter!(
            names::JOBS_DEQUEUED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .record(wait_time.as_secs_f64());
    }

    /// Record a job completed.
    pub fn job_completed(queue: &str, job_type: &str, duration: Duration) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job failed permanently.
    pub fn job_failed(queue: &str, job_type: &str, error_type: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a retry scheduled.
    pub fn job_retried(queue: &str, job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record a job timeout.
    pub fn job_timed_out(queue: &str, job_type: &str) {
        counter!(
            names::JOBS_TIMED_OUT_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a stalled job reclaimed by the reaper.
    pub fn job_stalled(queue: &str, job_type: &str) {
        counter!(
            names::JOBS_STALLED_TOTAL,
            "queue" => queue.to_string(),
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record an enqueue failure that the caller chose to ignore.
    pub fn enqueue_discarded(context: &str) {
        counter!(
            names::ENQUEUE_DISCARDED_TOTAL,
            "context" => context.to_string()
        )
        .increment(1);
    }

    /// Update the per-state gauges of one queue.
    pub fn update_queue_counts(queue: &str, counts: &JobCounts) {
        for (state, value) in [
            ("waiting", counts.waiting),
            ("active", counts.active),
            ("completed", counts.completed),
            ("failed", counts.failed),
        ] {
            gauge!(
                names::JOBS_STATE,
                "queue" => queue.to_string(),
                "state" => state
            )
            .set(value as f64);
        }
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update running worker loops for a pool.
    pub fn update_workers(pool_id: &str, active: usize) {
        gauge!(
            names::WORKERS_ACTIVE,
            "pool_id" => pool_id.to_string()
        )
        .set(active as f64);
    }
}

/// Redis metrics recorder.
#[derive(Clone)]
pub struct RedisMetrics;

impl RedisMetrics {
    /// Record operation duration.
    pub fn operation_duration(operation: &'static str, duration: Duration) {
        histogram!(
            names::REDIS_OPERATION_DURATION,
            "operation" => operation
        )
        .record(duration.as_secs_f64());
    }
}
