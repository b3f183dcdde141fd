//! End-to-end queue scenarios over the in-memory store.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use common::{analyze_payload, fake_collaborators, memory_manager, RecordingSender};
use resume_jobs::{
    Backoff, EmailTemplates, HandlerRegistry, JobContext, JobError, JobHandler, JobKind,
    JobOptions, JobPayload, JobResult, JobState, JobStore, ProcessOutcome, QueueName,
    StaleRecovery, StatsReporter, Worker, WelcomeEmailPayload,
};
use resume_jobs::{Job, JobCounts, JobId};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn default_registry(sender: Arc<RecordingSender>) -> Arc<HandlerRegistry> {
    Arc::new(HandlerRegistry::with_defaults(
        fake_collaborators(sender),
        EmailTemplates::new("https://resume2path.vercel.app"),
    ))
}

fn welcome() -> JobPayload {
    JobPayload::WelcomeEmail(WelcomeEmailPayload {
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
    })
}

#[tokio::test]
async fn test_welcome_email_scenario() {
    let manager = memory_manager();
    let stats = StatsReporter::new(manager.store().clone());
    let sender = Arc::new(RecordingSender::default());
    let worker = Worker::new(
        "worker-1",
        manager.clone(),
        default_registry(sender.clone()),
        Duration::from_secs(5),
    );

    manager
        .enqueue(QueueName::Email, welcome(), JobOptions::new())
        .await
        .unwrap();
    assert_eq!(stats.collect().await.email.waiting, 1);

    let outcome = worker.process_next(QueueName::Email).await.unwrap();
    assert!(matches!(outcome, ProcessOutcome::Completed(_)));

    let report = stats.collect().await;
    assert_eq!(report.email.completed, 1);
    assert_eq!(report.email.waiting, 0);
    assert_eq!(sender.sent.lock().len(), 1);
}

struct AlwaysFails {
    calls: AtomicU32,
}

#[async_trait]
impl JobHandler for AlwaysFails {
    fn kind(&self) -> JobKind {
        JobKind::AnalyzeResume
    }

    async fn handle(&self, _payload: JobPayload, _ctx: &JobContext) -> JobResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(JobError::external("analysis", "HTTP 500"))
    }
}

#[tokio::test]
async fn test_failing_analysis_runs_max_attempts() {
    let manager = memory_manager();
    let handler = Arc::new(AlwaysFails {
        calls: AtomicU32::new(0),
    });
    let mut registry = HandlerRegistry::new();
    registry.register(handler.clone());
    let worker = Worker::new("worker-1", manager.clone(), Arc::new(registry), Duration::from_secs(5));

    let handle = manager
        .enqueue(
            QueueName::Analysis,
            JobPayload::AnalyzeResume(analyze_payload(7)),
            JobOptions::new().max_attempts(3).backoff(Backoff::immediate()),
        )
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    loop {
        let outcome = worker.process_next(QueueName::Analysis).await.unwrap();
        if outcome == ProcessOutcome::Idle {
            break;
        }
        outcomes.push(outcome);
    }

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes.last(), Some(ProcessOutcome::Failed { .. })));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

    let job = manager.get_job(&handle.id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);

    let report = StatsReporter::new(manager.store().clone()).collect().await;
    assert_eq!(report.analysis.failed, 1);
}

#[tokio::test]
async fn test_analysis_enqueues_follow_up_email() {
    let manager = memory_manager();
    let sender = Arc::new(RecordingSender::default());
    let worker = Worker::new(
        "worker-1",
        manager.clone(),
        default_registry(sender.clone()),
        Duration::from_secs(5),
    );

    let handle = manager
        .queue_resume_analysis(analyze_payload(42))
        .await
        .unwrap();
    let outcome = worker.process_next(QueueName::Analysis).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Completed(handle.id.clone()));

    // Progress is persisted on the job record
    let analysis = manager.get_job(&handle.id).await.unwrap();
    assert_eq!(analysis.progress, 100);
    assert_eq!(analysis.result.as_ref().unwrap()["success"], true);

    // The follow-up email is delayed, so it is waiting but not yet due
    let email_counts = manager.store().counts(QueueName::Email).await.unwrap();
    assert_eq!(email_counts.waiting, 1);
    assert_eq!(
        worker.process_next(QueueName::Email).await.unwrap(),
        ProcessOutcome::Idle
    );

    let due = Utc::now() + chrono::Duration::seconds(3);
    let email_job = manager
        .store()
        .claim(QueueName::Email, "worker-1", due)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(email_job.job_type, JobKind::SendAnalysisEmail);
    assert_eq!(email_job.payload["fileName"], "resume.pdf");
    assert_eq!(email_job.payload["targetRole"], "Backend Engineer");
    assert_eq!(email_job.payload["analysisResult"]["overallScore"], 8);
}

#[tokio::test]
async fn test_delay_controls_claimability() {
    let manager = memory_manager();
    let now = Utc::now();

    let immediate = manager
        .enqueue(QueueName::Email, welcome(), JobOptions::new().delay_ms(0))
        .await
        .unwrap();
    let delayed = manager
        .enqueue(QueueName::Email, welcome(), JobOptions::new().delay_ms(60_000))
        .await
        .unwrap();

    let store = manager.store();
    let first = store.claim(QueueName::Email, "w", Utc::now()).await.unwrap();
    assert_eq!(first.map(|job| job.id), Some(immediate.id));
    assert!(store
        .claim(QueueName::Email, "w", now + chrono::Duration::seconds(59))
        .await
        .unwrap()
        .is_none());

    let later = delayed.delay_until;
    let second = store.claim(QueueName::Email, "w", later).await.unwrap();
    assert_eq!(second.map(|job| job.id), Some(delayed.id));
}

#[tokio::test]
async fn test_priority_then_fifo() {
    let manager = memory_manager();
    let mut ids = Vec::new();
    for priority in [3, 1, 3, 1] {
        let handle = manager
            .enqueue(
                QueueName::Email,
                welcome(),
                JobOptions::new().priority(priority),
            )
            .await
            .unwrap();
        ids.push(handle.id);
    }

    let mut claimed = Vec::new();
    while let Some(job) = manager
        .store()
        .claim(QueueName::Email, "w", Utc::now())
        .await
        .unwrap()
    {
        claimed.push(job.id);
    }

    assert_eq!(
        claimed,
        vec![ids[1].clone(), ids[3].clone(), ids[0].clone(), ids[2].clone()]
    );
}

#[tokio::test]
async fn test_total_is_sum_over_queues() {
    let manager = memory_manager();
    let sender = Arc::new(RecordingSender::default());
    let worker = Worker::new(
        "worker-1",
        manager.clone(),
        default_registry(sender),
        Duration::from_secs(5),
    );
    let stats = StatsReporter::new(manager.store().clone());

    let check = |counts: (JobCounts, JobCounts, JobCounts)| {
        let (analysis, email, total) = counts;
        assert_eq!(total, analysis + email);
    };

    for step in 0..6 {
        match step % 3 {
            0 => {
                manager.queue_resume_analysis(analyze_payload(step)).await.unwrap();
            }
            1 => {
                manager
                    .enqueue(QueueName::Email, welcome(), JobOptions::new())
                    .await
                    .unwrap();
            }
            _ => {
                worker.process_next(QueueName::Analysis).await.unwrap();
                worker.process_next(QueueName::Email).await.unwrap();
            }
        }
        let report = stats.collect().await;
        check((report.analysis, report.email, report.total));
    }

    let report = stats.collect().await;
    assert!(report.total.sum() > 0);
    assert!(report.error.is_none());
}

#[tokio::test]
async fn test_retention_applies_queue_settings() {
    let manager = memory_manager();
    let worker = Worker::new(
        "worker-1",
        manager.clone(),
        default_registry(Arc::new(RecordingSender::default())),
        Duration::from_secs(5),
    );
    let keep = manager.settings(QueueName::Email).remove_on_complete as u64;

    for _ in 0..keep + 5 {
        manager
            .enqueue(QueueName::Email, welcome(), JobOptions::new())
            .await
            .unwrap();
        worker.process_next(QueueName::Email).await.unwrap();
    }

    let counts = manager.store().counts(QueueName::Email).await.unwrap();
    assert_eq!(counts.completed, keep);
}

/// Store whose every call fails as if Redis were down.
struct DownStore;

#[async_trait]
impl JobStore for DownStore {
    async fn push(&self, _job: &Job) -> JobResult<()> {
        Err(down())
    }

    async fn claim(
        &self,
        _queue: QueueName,
        _worker_id: &str,
        _now: chrono::DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        Err(down())
    }

    async fn update_progress(&self, _id: &JobId, _worker_id: &str, _progress: u8) -> JobResult<()> {
        Err(down())
    }

    async fn complete(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _result: Option<Value>,
        _retain: usize,
    ) -> JobResult<Job> {
        Err(down())
    }

    async fn retry(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _error: &str,
        _run_at: chrono::DateTime<Utc>,
    ) -> JobResult<Job> {
        Err(down())
    }

    async fn fail(
        &self,
        _id: &JobId,
        _worker_id: &str,
        _error: &str,
        _retain: usize,
    ) -> JobResult<Job> {
        Err(down())
    }

    async fn get(&self, _id: &JobId) -> JobResult<Option<Job>> {
        Err(down())
    }

    async fn counts(&self, _queue: QueueName) -> JobResult<JobCounts> {
        Err(down())
    }

    async fn recover_stale(
        &self,
        _queue: QueueName,
        _stalled_before: chrono::DateTime<Utc>,
        _retain_failed: usize,
    ) -> JobResult<Vec<StaleRecovery>> {
        Err(down())
    }

    async fn ping(&self) -> JobResult<()> {
        Err(down())
    }
}

fn down() -> JobError {
    JobError::StoreUnavailable("Connection refused (os error 111)".to_string())
}

#[tokio::test]
async fn test_stats_degrade_when_store_down() {
    let report = StatsReporter::new(Arc::new(DownStore)).collect().await;

    assert!(report.is_degraded());
    assert_eq!(report.total, JobCounts::default());
    assert!(report.error.unwrap().contains("Connection refused"));
}

#[tokio::test]
async fn test_enqueue_failure_is_store_unavailable() {
    let manager = resume_jobs::QueueManager::new(Arc::new(DownStore), Default::default());

    let err = manager
        .enqueue(QueueName::Email, welcome(), JobOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_store_failure());
}
