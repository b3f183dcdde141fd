//! Integration tests for RedisJobStore.
//!
//! These tests run against a real Redis server using testcontainers.
//! Requires Docker: `cargo test -p resume-jobs --test redis_store -- --ignored`

use chrono::{Duration as ChronoDuration, Utc};
use resume_config::{QueuesConfig, RedisConfig};
use resume_jobs::{
    JobOptions, JobPayload, JobState, JobStore, QueueManager, QueueName, RedisJobStore,
    StaleRecovery, WelcomeEmailPayload,
};
use serde_json::json;
use std::sync::Arc;
use testcontainers::{runners::AsyncRunner, ContainerAsync};
use testcontainers_modules::redis::Redis;

/// Redis testcontainer with a connected store.
struct TestRedis {
    _container: ContainerAsync<Redis>,
    store: Arc<RedisJobStore>,
}

impl TestRedis {
    async fn new() -> Self {
        let container = Redis::default()
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let config = RedisConfig {
            url: format!("redis://127.0.0.1:{}", port),
            pool_size: 4,
            key_prefix: "test:jobs".to_string(),
            ..RedisConfig::default()
        };

        let store = RedisJobStore::connect(&config)
            .await
            .expect("Failed to connect to Redis");

        Self {
            _container: container,
            store: Arc::new(store),
        }
    }

    fn manager(&self) -> QueueManager {
        QueueManager::new(self.store.clone(), QueuesConfig::default())
    }
}

fn welcome(name: &str) -> JobPayload {
    JobPayload::WelcomeEmail(WelcomeEmailPayload {
        email: format!("{}@example.com", name.to_lowercase()),
        name: name.to_string(),
    })
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_claim_order_priority_then_fifo() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let low = manager
        .enqueue(QueueName::Email, welcome("Low"), JobOptions::new().priority(5))
        .await
        .unwrap();
    let first = manager
        .enqueue(QueueName::Email, welcome("First"), JobOptions::new().priority(1))
        .await
        .unwrap();
    let second = manager
        .enqueue(QueueName::Email, welcome("Second"), JobOptions::new().priority(1))
        .await
        .unwrap();

    let mut order = Vec::new();
    while let Some(job) = redis
        .store
        .claim(QueueName::Email, "w1", Utc::now())
        .await
        .unwrap()
    {
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.worker_id.as_deref(), Some("w1"));
        order.push(job.id);
    }

    assert_eq!(order, vec![first.id, second.id, low.id]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delayed_job_promoted_when_due() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let handle = manager
        .enqueue(QueueName::Email, welcome("Later"), JobOptions::new().delay_ms(60_000))
        .await
        .unwrap();

    let counts = redis.store.counts(QueueName::Email).await.unwrap();
    assert_eq!(counts.waiting, 1);

    let early = redis
        .store
        .claim(QueueName::Email, "w1", Utc::now())
        .await
        .unwrap();
    assert!(early.is_none());

    let due = redis
        .store
        .claim(QueueName::Email, "w1", handle.delay_until)
        .await
        .unwrap();
    assert_eq!(due.map(|job| job.id), Some(handle.id));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_complete_persists_result_and_counts() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let handle = manager
        .enqueue(QueueName::Email, welcome("Ada"), JobOptions::new())
        .await
        .unwrap();
    let job = redis
        .store
        .claim(QueueName::Email, "w1", Utc::now())
        .await
        .unwrap()
        .unwrap();

    redis.store.update_progress(&job.id, "w1", 50).await.unwrap();
    redis
        .store
        .complete(&job.id, "w1", Some(json!({"delivered": true})), 20)
        .await
        .unwrap();

    let stored = manager.get_job(&handle.id).await.unwrap();
    assert_eq!(stored.state, JobState::Completed);
    assert_eq!(stored.progress, 50);
    assert_eq!(stored.result, Some(json!({"delivered": true})));

    let counts = redis.store.counts(QueueName::Email).await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.active, 0);
    assert_eq!(counts.waiting, 0);

    // A second completion is rejected
    assert!(redis.store.complete(&job.id, "w1", None, 20).await.is_err());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_retention_evicts_oldest_records() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let mut ids = Vec::new();
    for n in 0..4 {
        let handle = manager
            .enqueue(QueueName::Email, welcome(&format!("User{}", n)), JobOptions::new())
            .await
            .unwrap();
        redis
            .store
            .claim(QueueName::Email, "w1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        redis.store.complete(&handle.id, "w1", None, 2).await.unwrap();
        ids.push(handle.id);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    assert_eq!(redis.store.counts(QueueName::Email).await.unwrap().completed, 2);
    assert!(redis.store.get(&ids[0]).await.unwrap().is_none());
    assert!(redis.store.get(&ids[1]).await.unwrap().is_none());
    assert!(redis.store.get(&ids[3]).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_retry_requeues_with_delay() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let handle = manager
        .enqueue(QueueName::Email, welcome("Retry"), JobOptions::new())
        .await
        .unwrap();
    let job = redis
        .store
        .claim(QueueName::Email, "w1", Utc::now())
        .await
        .unwrap()
        .unwrap();

    let run_at = Utc::now() + ChronoDuration::seconds(30);
    let retried = redis.store.retry(&job.id, "w1", "HTTP 503", run_at).await.unwrap();
    assert_eq!(retried.state, JobState::Waiting);
    assert_eq!(retried.error.as_deref(), Some("HTTP 503"));

    assert!(redis
        .store
        .claim(QueueName::Email, "w1", Utc::now())
        .await
        .unwrap()
        .is_none());
    let again = redis
        .store
        .claim(QueueName::Email, "w2", run_at)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, handle.id);
    assert_eq!(again.attempts, 2);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_recover_stale_requeues_abandoned_job() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let handle = manager
        .enqueue(QueueName::Email, welcome("Stale"), JobOptions::new().max_attempts(3))
        .await
        .unwrap();
    let claimed_at = Utc::now() - ChronoDuration::minutes(10);
    redis
        .store
        .claim(QueueName::Email, "dead-worker", claimed_at)
        .await
        .unwrap()
        .unwrap();

    let recovered = redis
        .store
        .recover_stale(QueueName::Email, Utc::now() - ChronoDuration::minutes(5), 10)
        .await
        .unwrap();
    assert_eq!(recovered.len(), 1);
    assert!(matches!(recovered[0], StaleRecovery::Requeued(_)));

    // The dead worker can no longer complete it
    assert!(redis.store.complete(&handle.id, "dead-worker", None, 10).await.is_err());

    let job = redis
        .store
        .claim(QueueName::Email, "w2", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.id, handle.id);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_reclaimed_job_rejects_previous_holder() {
    let redis = TestRedis::new().await;
    let manager = redis.manager();

    let handle = manager
        .enqueue(QueueName::Email, welcome("Slow"), JobOptions::new().max_attempts(5))
        .await
        .unwrap();
    let claimed_at = Utc::now() - ChronoDuration::minutes(10);
    redis
        .store
        .claim(QueueName::Email, "worker-a", claimed_at)
        .await
        .unwrap()
        .unwrap();
    redis
        .store
        .recover_stale(QueueName::Email, Utc::now() - ChronoDuration::minutes(5), 10)
        .await
        .unwrap();
    let job = redis
        .store
        .claim(QueueName::Email, "worker-b", Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.id, handle.id);

    // Writes from the previous holder are rejected and change nothing
    let now = Utc::now();
    assert!(redis.store.retry(&job.id, "worker-a", "A failed", now).await.is_err());
    assert!(redis.store.update_progress(&job.id, "worker-a", 90).await.is_err());
    assert!(redis.store.complete(&job.id, "worker-a", None, 10).await.is_err());
    assert!(redis
        .store
        .claim(QueueName::Email, "worker-c", now)
        .await
        .unwrap()
        .is_none());

    let held = manager.get_job(&job.id).await.unwrap();
    assert_eq!(held.state, JobState::Active);
    assert_eq!(held.worker_id.as_deref(), Some("worker-b"));
    assert_eq!(held.progress, 0);

    let counts = redis.store.counts(QueueName::Email).await.unwrap();
    assert_eq!(counts.active, 1);
    assert_eq!(counts.waiting, 0);

    redis.store.update_progress(&job.id, "worker-b", 60).await.unwrap();
    let done = redis.store.complete(&job.id, "worker-b", None, 10).await.unwrap();
    assert_eq!(done.state, JobState::Completed);
    assert_eq!(done.progress, 60);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_ping() {
    let redis = TestRedis::new().await;
    redis.store.ping().await.unwrap();
}
