use super::JobHandler;
use crate::clients::{EmailMessage, EmailSender};
use crate::error::{JobError, JobResult};
use crate::job::{JobContext, JobPayload};
use crate::queue::JobKind;
use crate::templates::EmailTemplates;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

fn mismatch(expected: JobKind, got: &JobPayload) -> JobError {
    JobError::PayloadMismatch(format!("{} handler got {}", expected, got.kind()))
}

async fn deliver(
    sender: &dyn EmailSender,
    ctx: &JobContext,
    message: EmailMessage,
) -> JobResult<Value> {
    let receipt = sender.send(&message).await?;
    info!(
        job_id = %ctx.job_id(),
        job_type = %ctx.kind(),
        delivered = receipt.delivered,
        "Email job finished"
    );
    Ok(serde_json::to_value(receipt)?)
}

/// Sends `send-welcome-email` jobs.
pub struct WelcomeEmailHandler {
    sender: Arc<dyn EmailSender>,
    templates: EmailTemplates,
}

impl WelcomeEmailHandler {
    pub fn new(sender: Arc<dyn EmailSender>, templates: EmailTemplates) -> Self {
        Self { sender, templates }
    }
}

#[async_trait]
impl JobHandler for WelcomeEmailHandler {
    fn kind(&self) -> JobKind {
        JobKind::SendWelcomeEmail
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<Value> {
        let data = match payload {
            JobPayload::WelcomeEmail(data) => data,
            other => return Err(mismatch(self.kind(), &other)),
        };

        let rendered = self.templates.welcome(&data.name);
        let message = EmailMessage {
            to: data.email,
            subject: rendered.subject,
            html: rendered.html,
        };
        deliver(self.sender.as_ref(), ctx, message).await
    }
}

/// Sends `send-analysis-email` jobs.
pub struct AnalysisEmailHandler {
    sender: Arc<dyn EmailSender>,
    templates: EmailTemplates,
}

impl AnalysisEmailHandler {
    pub fn new(sender: Arc<dyn EmailSender>, templates: EmailTemplates) -> Self {
        Self { sender, templates }
    }
}

#[async_trait]
impl JobHandler for AnalysisEmailHandler {
    fn kind(&self) -> JobKind {
        JobKind::SendAnalysisEmail
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<Value> {
        let data = match payload {
            JobPayload::AnalysisEmail(data) => data,
            other => return Err(mismatch(self.kind(), &other)),
        };

        let rendered = self.templates.analysis(&data);
        let message = EmailMessage {
            to: data.email,
            subject: rendered.subject,
            html: rendered.html,
        };
        deliver(self.sender.as_ref(), ctx, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::EmailReceipt;
    use crate::job::{AnalysisEmailPayload, WelcomeEmailPayload};
    use crate::manager::QueueManager;
    use crate::queue::QueueName;
    use crate::store::MemoryJobStore;
    use chrono::Utc;
    use parking_lot::Mutex;
    use resume_config::QueuesConfig;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSender(Mutex<Vec<EmailMessage>>);

    #[async_trait]
    impl EmailSender for RecordingSender {
        async fn send(&self, message: &EmailMessage) -> JobResult<EmailReceipt> {
            self.0.lock().push(message.clone());
            Ok(EmailReceipt {
                delivered: true,
                id: Some("msg_1".to_string()),
            })
        }
    }

    struct DownSender;

    #[async_trait]
    impl EmailSender for DownSender {
        async fn send(&self, _message: &EmailMessage) -> JobResult<EmailReceipt> {
            Err(JobError::external("email", "HTTP 503"))
        }
    }

    async fn context() -> JobContext {
        let manager = QueueManager::new(Arc::new(MemoryJobStore::new()), QueuesConfig::default());
        manager
            .enqueue(
                QueueName::Email,
                JobPayload::WelcomeEmail(WelcomeEmailPayload {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                }),
                Default::default(),
            )
            .await
            .unwrap();
        let job = manager
            .store()
            .claim(QueueName::Email, "w", Utc::now())
            .await
            .unwrap()
            .unwrap();
        JobContext::new(&job, "w", manager)
    }

    fn templates() -> EmailTemplates {
        EmailTemplates::new("https://resume2path.vercel.app")
    }

    #[tokio::test]
    async fn test_welcome_email_sent() {
        let sender = Arc::new(RecordingSender::default());
        let handler = WelcomeEmailHandler::new(sender.clone(), templates());
        let ctx = context().await;

        let result = handler
            .handle(
                JobPayload::WelcomeEmail(WelcomeEmailPayload {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                }),
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(result, json!({"delivered": true, "messageId": "msg_1"}));
        let sent = sender.0.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ada@example.com");
        assert_eq!(sent[0].subject, "Welcome to Resume2Path!");
    }

    #[tokio::test]
    async fn test_analysis_email_sent() {
        let sender = Arc::new(RecordingSender::default());
        let handler = AnalysisEmailHandler::new(sender.clone(), templates());
        let ctx = context().await;

        handler
            .handle(
                JobPayload::AnalysisEmail(AnalysisEmailPayload {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                    analysis_result: json!({"overallScore": 7}),
                    file_name: "resume.pdf".into(),
                    target_role: "Data Engineer".into(),
                }),
                &ctx,
            )
            .await
            .unwrap();

        let sent = sender.0.lock();
        assert_eq!(sent[0].subject, "Your Data Engineer Resume Analysis is Ready!");
        assert!(sent[0].html.contains("7/10"));
    }

    #[tokio::test]
    async fn test_send_failure_propagates() {
        let handler = WelcomeEmailHandler::new(Arc::new(DownSender), templates());
        let ctx = context().await;

        let err = handler
            .handle(
                JobPayload::WelcomeEmail(WelcomeEmailPayload {
                    email: "ada@example.com".into(),
                    name: "Ada".into(),
                }),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
