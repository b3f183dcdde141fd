//! Per-queue job counts.

use crate::metrics::JobMetrics;
use crate::queue::QueueName;
use crate::store::JobStore;
use serde::Serialize;
use std::ops::{Add, AddAssign};
use std::sync::Arc;
use tracing::warn;

/// Jobs per state on one queue. Delayed jobs count as waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl JobCounts {
    /// Sum over all states.
    pub fn sum(&self) -> u64 {
        self.waiting + self.active + self.completed + self.failed
    }
}

impl Add for JobCounts {
    type Output = JobCounts;

    fn add(self, rhs: JobCounts) -> JobCounts {
        JobCounts {
            waiting: self.waiting + rhs.waiting,
            active: self.active + rhs.active,
            completed: self.completed + rhs.completed,
            failed: self.failed + rhs.failed,
        }
    }
}

impl AddAssign for JobCounts {
    fn add_assign(&mut self, rhs: JobCounts) {
        *self = *self + rhs;
    }
}

/// Stats for every queue plus their total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatsReport {
    pub analysis: JobCounts,
    pub email: JobCounts,
    pub total: JobCounts,

    /// Set when the store could not be read; all counts are then zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueStatsReport {
    /// Builds a report; `total` is the field-wise sum.
    pub fn from_counts(analysis: JobCounts, email: JobCounts) -> Self {
        Self {
            analysis,
            email,
            total: analysis + email,
            error: None,
        }
    }

    /// All-zero report carrying an error.
    pub fn zeroed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Counts of one queue.
    pub fn queue(&self, queue: QueueName) -> JobCounts {
        match queue {
            QueueName::Analysis => self.analysis,
            QueueName::Email => self.email,
        }
    }

    /// Returns true if the counts could not be read.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Reads queue counts from the store.
#[derive(Clone)]
pub struct StatsReporter {
    store: Arc<dyn JobStore>,
}

impl StatsReporter {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Collects counts for every queue.
    ///
    /// Never fails: a store error yields an all-zero report with `error` set.
    pub async fn collect(&self) -> QueueStatsReport {
        let analysis = match self.store.counts(QueueName::Analysis).await {
            Ok(counts) => counts,
            Err(e) => return Self::degraded(e),
        };
        let email = match self.store.counts(QueueName::Email).await {
            Ok(counts) => counts,
            Err(e) => return Self::degraded(e),
        };

        JobMetrics::update_queue_counts(QueueName::Analysis.as_str(), &analysis);
        JobMetrics::update_queue_counts(QueueName::Email.as_str(), &email);

        QueueStatsReport::from_counts(analysis, email)
    }

    fn degraded(err: crate::error::JobError) -> QueueStatsReport {
        warn!(error = %err, "Failed to read queue stats");
        QueueStatsReport::zeroed(err.to_string())
    }
}
