//! Queue names, job kinds and enqueue options.

use crate::error::{JobError, JobResult};
use crate::retry::Backoff;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Largest accepted priority value.
///
/// Wait-set scores are `priority * 2^32 + seq`; keeping the priority below
/// 2^21 keeps every score exactly representable as an `f64`.
pub const MAX_PRIORITY: u32 = (1 << 21) - 1;

/// Priority of `analyze-resume` jobs queued through the typed helper.
pub const ANALYSIS_PRIORITY: u32 = 1;

/// Priority of email jobs queued through the typed helpers.
pub const EMAIL_PRIORITY: u32 = 2;

/// Delay applied to welcome emails.
pub const WELCOME_EMAIL_DELAY: Duration = Duration::from_millis(1000);

/// Delay applied to analysis result emails.
pub const ANALYSIS_EMAIL_DELAY: Duration = Duration::from_millis(2000);

/// The fixed set of queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueName {
    /// LLM resume analysis.
    Analysis,
    /// Email delivery.
    Email,
}

impl QueueName {
    /// Every queue, in polling order.
    pub const ALL: [QueueName; 2] = [QueueName::Analysis, QueueName::Email];

    /// Wire name of the queue.
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueName::Analysis => "analysis",
            QueueName::Email => "email",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analysis" => Ok(QueueName::Analysis),
            "email" => Ok(QueueName::Email),
            other => Err(JobError::Validation(format!("Unknown queue: {}", other))),
        }
    }
}

/// Job type tag selecting the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Run the LLM analysis for an uploaded resume.
    AnalyzeResume,
    /// Send the welcome email to a new user.
    SendWelcomeEmail,
    /// Send the analysis results email.
    SendAnalysisEmail,
}

impl JobKind {
    /// Every job kind.
    pub const ALL: [JobKind; 3] = [
        JobKind::AnalyzeResume,
        JobKind::SendWelcomeEmail,
        JobKind::SendAnalysisEmail,
    ];

    /// Wire name of the job type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JobKind::AnalyzeResume => "analyze-resume",
            JobKind::SendWelcomeEmail => "send-welcome-email",
            JobKind::SendAnalysisEmail => "send-analysis-email",
        }
    }

    /// The queue this kind of job runs on.
    pub const fn queue(&self) -> QueueName {
        match self {
            JobKind::AnalyzeResume => QueueName::Analysis,
            JobKind::SendWelcomeEmail | JobKind::SendAnalysisEmail => QueueName::Email,
        }
    }

    /// Priority and delay used by the typed producer helpers.
    pub fn default_options(&self) -> JobOptions {
        match self {
            JobKind::AnalyzeResume => JobOptions::new().priority(ANALYSIS_PRIORITY),
            JobKind::SendWelcomeEmail => JobOptions::new()
                .priority(EMAIL_PRIORITY)
                .delay(WELCOME_EMAIL_DELAY),
            JobKind::SendAnalysisEmail => JobOptions::new()
                .priority(EMAIL_PRIORITY)
                .delay(ANALYSIS_EMAIL_DELAY),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| JobError::UnknownJobType(s.to_string()))
    }
}

/// Per-job enqueue options.
///
/// Unset fields fall back to priority 0, no delay, and the target queue's
/// configured attempts and backoff.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    priority: Option<u32>,
    delay: Option<Duration>,
    max_attempts: Option<u32>,
    backoff: Option<Backoff>,
}

impl JobOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the priority (lower runs first).
    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set a delay before the job becomes claimable.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the delay in milliseconds.
    pub fn delay_ms(self, delay_ms: u64) -> Self {
        self.delay(Duration::from_millis(delay_ms))
    }

    /// Override the queue's attempt limit.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Override the queue's backoff.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Effective priority.
    pub fn priority_value(&self) -> u32 {
        self.priority.unwrap_or(0)
    }

    /// Effective delay.
    pub fn delay_value(&self) -> Duration {
        self.delay.unwrap_or(Duration::ZERO)
    }

    /// Attempt override, if any.
    pub fn max_attempts_override(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Backoff override, if any.
    pub fn backoff_override(&self) -> Option<Backoff> {
        self.backoff
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> JobResult<()> {
        let priority = self.priority_value();
        if priority > MAX_PRIORITY {
            return Err(JobError::Validation(format!(
                "priority {} exceeds maximum {}",
                priority, MAX_PRIORITY
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(JobError::Validation(
                "max attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
