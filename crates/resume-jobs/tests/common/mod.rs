//! Shared fixtures for queue integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use resume_config::QueuesConfig;
use resume_jobs::{
    AnalysisSink, AnalyzeResumePayload, Collaborators, EmailMessage, EmailReceipt, EmailSender,
    JobResult, MemoryJobStore, QueueManager, ResumeAnalyzer,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Manager over a fresh in-memory store.
pub fn memory_manager() -> QueueManager {
    QueueManager::new(Arc::new(MemoryJobStore::new()), QueuesConfig::default())
}

pub fn analyze_payload(resume_id: i64) -> AnalyzeResumePayload {
    AnalyzeResumePayload {
        resume_id,
        file_url: format!("https://files.example.com/{}.pdf", resume_id),
        text_content: "Seven years of backend work in Rust and Go".to_string(),
        target_role: "Backend Engineer".to_string(),
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
    }
}

/// Analyzer returning a fixed critique.
pub struct StaticAnalyzer;

#[async_trait]
impl ResumeAnalyzer for StaticAnalyzer {
    async fn analyze(&self, _text: &str, _target_role: &str) -> JobResult<Value> {
        Ok(json!({
            "overallScore": 8,
            "strengths": ["Strong systems background"],
            "improvements": ["Quantify impact"],
            "recommendations": ["Lead with recent projects"]
        }))
    }
}

/// Sink that records stored results.
#[derive(Default)]
pub struct RecordingSink {
    pub stored: Mutex<Vec<(i64, Value)>>,
}

#[async_trait]
impl AnalysisSink for RecordingSink {
    async fn store(&self, resume_id: i64, result: &Value) -> JobResult<()> {
        self.stored.lock().push((resume_id, result.clone()));
        Ok(())
    }
}

/// Sender that records outgoing messages.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<EmailMessage>>,
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, message: &EmailMessage) -> JobResult<EmailReceipt> {
        self.sent.lock().push(message.clone());
        Ok(EmailReceipt {
            delivered: true,
            id: Some(format!("msg_{}", self.sent.lock().len())),
        })
    }
}

/// Collaborators backed by the recording fakes.
pub fn fake_collaborators(sender: Arc<RecordingSender>) -> Collaborators {
    Collaborators {
        analyzer: Arc::new(StaticAnalyzer),
        sink: Arc::new(RecordingSink::default()),
        email: sender,
    }
}
