//! Reclaims jobs abandoned by crashed workers.

use crate::error::JobResult;
use crate::events::JobEvent;
use crate::manager::QueueManager;
use crate::metrics::JobMetrics;
use crate::queue::QueueName;
use crate::store::StaleRecovery;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Jobs reclaimed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapSummary {
    pub requeued: usize,
    pub failed: usize,
}

/// Periodically requeues jobs that stayed active longer than `stale_after`.
pub struct StaleJobReaper {
    manager: QueueManager,
    stale_after: Duration,
    interval: Duration,
}

impl StaleJobReaper {
    pub fn new(manager: QueueManager, stale_after: Duration, interval: Duration) -> Self {
        Self {
            manager,
            stale_after,
            interval,
        }
    }

    /// Sweeps every queue once.
    pub async fn reap_once(&self) -> JobResult<ReapSummary> {
        let stale_after = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let stalled_before = Utc::now() - stale_after;
        let mut summary = ReapSummary::default();

        for queue in QueueName::ALL {
            let retain = self.manager.settings(queue).remove_on_fail;
            let recovered = self
                .manager
                .store()
                .recover_stale(queue, stalled_before, retain)
                .await?;

            for recovery in recovered {
                let job = recovery.job();
                JobMetrics::job_stalled(queue.as_str(), job.job_type.as_str());

                match &recovery {
                    StaleRecovery::Requeued(job) => {
                        summary.requeued += 1;
                        self.manager.emit(JobEvent::Stalled {
                            job_id: job.id.clone(),
                            queue,
                            job_type: job.job_type,
                            attempts: job.attempts,
                        });
                    }
                    StaleRecovery::Failed(job) => {
                        summary.failed += 1;
                        warn!(job_id = %job.id, queue = %queue, attempts = job.attempts, "Stalled job exhausted its attempts");
                        self.manager.emit(JobEvent::Failed {
                            job_id: job.id.clone(),
                            queue,
                            job_type: job.job_type,
                            attempts: job.attempts,
                            error: job.error.clone().unwrap_or_default(),
                        });
                    }
                }
            }
        }

        if summary != ReapSummary::default() {
            info!(
                requeued = summary.requeued,
                failed = summary.failed,
                "Recovered stalled jobs"
            );
        }
        Ok(summary)
    }

    /// Runs sweeps every `interval` until shutdown is signalled.
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                stale_after_secs = self.stale_after.as_secs(),
                interval_secs = self.interval.as_secs(),
                "Stale job reaper started"
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.reap_once().await {
                            error!(error = %e, "Stale job sweep failed");
                        }
                    }
                }
            }
            debug!("Stale job reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobPayload, JobState, WelcomeEmailPayload};
    use crate::queue::JobOptions;
    use crate::store::MemoryJobStore;
    use resume_config::QueuesConfig;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reaper_requeues_then_fails() {
        let manager = QueueManager::new(Arc::new(MemoryJobStore::new()), QueuesConfig::default());
        let handle = manager
            .enqueue(
                QueueName::Email,
                JobPayload::WelcomeEmail(WelcomeEmailPayload {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                }),
                JobOptions::new().max_attempts(2),
            )
            .await
            .unwrap();
        let reaper = StaleJobReaper::new(manager.clone(), Duration::ZERO, Duration::from_secs(1));
        let mut events = manager.subscribe();

        // First holder dies
        manager
            .store()
            .claim(QueueName::Email, "dead-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let summary = reaper.reap_once().await.unwrap();
        assert_eq!(summary, ReapSummary { requeued: 1, failed: 0 });
        assert_eq!(manager.get_job(&handle.id).await.unwrap().state, JobState::Waiting);
        assert!(matches!(events.recv().await.unwrap(), JobEvent::Stalled { .. }));

        // Second holder dies on the last attempt
        manager
            .store()
            .claim(QueueName::Email, "dead-2", Utc::now())
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let summary = reaper.reap_once().await.unwrap();
        assert_eq!(summary, ReapSummary { requeued: 0, failed: 1 });

        let job = manager.get_job(&handle.id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.error.as_deref(), Some(crate::job::STALLED_ERROR));
    }

    #[tokio::test]
    async fn test_reaper_stops_on_shutdown() {
        let manager = QueueManager::new(Arc::new(MemoryJobStore::new()), QueuesConfig::default());
        let (tx, rx) = broadcast::channel(1);
        let handle = StaleJobReaper::new(manager, Duration::from_secs(60), Duration::from_millis(10))
            .spawn(rx);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
