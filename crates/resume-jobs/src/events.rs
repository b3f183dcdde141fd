//! Job lifecycle events.

use crate::job::JobId;
use crate::queue::{JobKind, QueueName};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Enqueued {
        job_id: JobId,
        queue: QueueName,
        job_type: JobKind,
    },
    Progress {
        job_id: JobId,
        queue: QueueName,
        progress: u8,
    },
    Completed {
        job_id: JobId,
        queue: QueueName,
        job_type: JobKind,
        attempts: u32,
    },
    Retrying {
        job_id: JobId,
        queue: QueueName,
        job_type: JobKind,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    Failed {
        job_id: JobId,
        queue: QueueName,
        job_type: JobKind,
        attempts: u32,
        error: String,
    },
    Stalled {
        job_id: JobId,
        queue: QueueName,
        job_type: JobKind,
        attempts: u32,
    },
}

impl JobEvent {
    /// ID of the job the event is about.
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Retrying { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Stalled { job_id, .. } => job_id,
        }
    }
}

/// Creates the event channel.
pub fn event_channel() -> broadcast::Sender<JobEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Logs completions and failures until the channel closes.
pub fn spawn_event_logger(mut rx: broadcast::Receiver<JobEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Event logger stopped");
    })
}

fn log_event(event: &JobEvent) {
    match event {
        JobEvent::Completed {
            job_id,
            queue,
            job_type,
            attempts,
        } => {
            info!(job_id = %job_id, queue = %queue, job_type = %job_type, attempts, "Job completed");
        }
        JobEvent::Failed {
            job_id,
            queue,
            job_type,
            attempts,
            error: err,
        } => {
            error!(job_id = %job_id, queue = %queue, job_type = %job_type, attempts, error = %err, "Job failed");
        }
        JobEvent::Stalled {
            job_id,
            queue,
            job_type,
            attempts,
        } => {
            warn!(job_id = %job_id, queue = %queue, job_type = %job_type, attempts, "Job stalled, requeued");
        }
        other => debug!(event = ?other, "Job event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tag() {
        let event = JobEvent::Failed {
            job_id: JobId::from("job-1"),
            queue: QueueName::Analysis,
            job_type: JobKind::AnalyzeResume,
            attempts: 3,
            error: "boom".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "failed");
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["queue"], "analysis");
        assert_eq!(event.job_id().as_str(), "job-1");
    }

    #[tokio::test]
    async fn test_event_logger_stops_when_channel_closes() {
        let tx = event_channel();
        let handle = spawn_event_logger(tx.subscribe());

        tx.send(JobEvent::Completed {
            job_id: JobId::from("job-2"),
            queue: QueueName::Email,
            job_type: JobKind::SendWelcomeEmail,
            attempts: 1,
        })
        .unwrap();
        drop(tx);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("logger did not stop")
            .unwrap();
    }
}
