//! HTTP collaborators used by the job handlers.
//!
//! The analysis endpoint, the analysis result store and the email API are
//! opaque external services; each sits behind a trait so handlers can be
//! tested without the network.

use crate::error::{JobError, JobResult};
use async_trait::async_trait;
use reqwest::{Client, Response};
use resume_config::{EmailConfig, IntegrationsConfig};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest resume text sent to the analysis endpoint, in characters.
pub const MAX_ANALYSIS_CHARS: usize = 14_000;

const ANALYSIS_SERVICE: &str = "analysis";
const RESULT_STORE_SERVICE: &str = "result-store";
const EMAIL_SERVICE: &str = "email";

/// Produces a structured critique of a resume.
#[async_trait]
pub trait ResumeAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, target_role: &str) -> JobResult<Value>;
}

/// Persists analysis results for a resume.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn store(&self, resume_id: i64, result: &Value) -> JobResult<()>;
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Outcome of a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailReceipt {
    /// False when sending is disabled.
    pub delivered: bool,
    /// Provider message ID, when delivered.
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Delivers email.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> JobResult<EmailReceipt>;
}

fn build_client(timeout: Duration) -> JobResult<Client> {
    Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

fn request_error(service: &str, err: reqwest::Error) -> JobError {
    if err.is_timeout() {
        JobError::external(service, format!("request timed out: {}", err))
    } else {
        JobError::external(service, err.to_string())
    }
}

async fn ensure_success(service: &str, response: Response) -> JobResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(JobError::external(
        service,
        format!("HTTP {}: {}", status, body.trim()),
    ))
}

/// Calls the LLM analysis endpoint of the web app.
pub struct HttpResumeAnalyzer {
    client: Client,
    base_url: String,
}

impl HttpResumeAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> JobResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ResumeAnalyzer for HttpResumeAnalyzer {
    async fn analyze(&self, text: &str, target_role: &str) -> JobResult<Value> {
        let text: String = text.chars().take(MAX_ANALYSIS_CHARS).collect();
        let url = format!("{}/api/gemini", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "text": text,
                "targetRole": target_role,
                "isChat": false,
            }))
            .send()
            .await
            .map_err(|e| request_error(ANALYSIS_SERVICE, e))?;

        let result: Value = ensure_success(ANALYSIS_SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| JobError::external(ANALYSIS_SERVICE, format!("invalid JSON: {}", e)))?;

        debug!(target_role = %target_role, "Resume analyzed");
        Ok(result)
    }
}

/// Saves analysis results through the web app.
pub struct HttpAnalysisSink {
    client: Client,
    base_url: String,
}

impl HttpAnalysisSink {
    pub fn new(base_url: &str, timeout: Duration) -> JobResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AnalysisSink for HttpAnalysisSink {
    async fn store(&self, resume_id: i64, result: &Value) -> JobResult<()> {
        let url = format!("{}/api/analysis/{}", self.base_url, resume_id);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "result": result }))
            .send()
            .await
            .map_err(|e| request_error(RESULT_STORE_SERVICE, e))?;
        ensure_success(RESULT_STORE_SERVICE, response).await?;

        debug!(resume_id, "Analysis result stored");
        Ok(())
    }
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Sends email through the Resend HTTP API.
pub struct ResendEmailSender {
    client: Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl ResendEmailSender {
    pub fn new(config: &EmailConfig, api_key: impl Into<String>) -> JobResult<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, message: &EmailMessage) -> JobResult<EmailReceipt> {
        let url = format!("{}/emails", self.api_url);
        let body = ResendRequest {
            from: &self.from,
            to: [message.to.as_str()],
            subject: &message.subject,
            html: &message.html,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(EMAIL_SERVICE, e))?;

        let sent: ResendResponse = ensure_success(EMAIL_SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| JobError::external(EMAIL_SERVICE, format!("invalid JSON: {}", e)))?;

        debug!(message_id = ?sent.id, "Email accepted by provider");
        Ok(EmailReceipt {
            delivered: true,
            id: sent.id,
        })
    }
}

/// Used when no email API key is configured: logs and skips.
#[derive(Debug, Default)]
pub struct DisabledEmailSender;

#[async_trait]
impl EmailSender for DisabledEmailSender {
    async fn send(&self, message: &EmailMessage) -> JobResult<EmailReceipt> {
        info!(subject = %message.subject, "Email API key not configured, skipping email");
        Ok(EmailReceipt {
            delivered: false,
            id: None,
        })
    }
}

/// Picks the Resend sender when an API key is set, otherwise the disabled one.
pub fn email_sender_from_config(config: &EmailConfig) -> JobResult<Arc<dyn EmailSender>> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => Ok(Arc::new(ResendEmailSender::new(config, key)?)),
        _ => Ok(Arc::new(DisabledEmailSender)),
    }
}

/// All collaborators the handlers need.
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn ResumeAnalyzer>,
    pub sink: Arc<dyn AnalysisSink>,
    pub email: Arc<dyn EmailSender>,
}

impl Collaborators {
    /// Builds the HTTP-backed collaborators.
    pub fn from_config(config: &IntegrationsConfig) -> JobResult<Self> {
        Ok(Self {
            analyzer: Arc::new(HttpResumeAnalyzer::new(
                &config.app_url,
                config.analysis_timeout(),
            )?),
            sink: Arc::new(HttpAnalysisSink::new(
                &config.app_url,
                config.result_store_timeout(),
            )?),
            email: email_sender_from_config(&config.email)?,
        })
    }
}
