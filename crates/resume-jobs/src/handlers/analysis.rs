use super::JobHandler;
use crate::clients::{AnalysisSink, ResumeAnalyzer};
use crate::error::{JobError, JobResult};
use crate::job::{AnalysisEmailPayload, JobContext, JobPayload};
use crate::manager::FireAndForget;
use crate::queue::JobKind;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// File name shown in the analysis email.
const RESULT_FILE_NAME: &str = "resume.pdf";

/// Runs the LLM analysis, stores the result and queues the results email.
pub struct AnalyzeResumeHandler {
    analyzer: Arc<dyn ResumeAnalyzer>,
    sink: Arc<dyn AnalysisSink>,
}

impl AnalyzeResumeHandler {
    pub fn new(analyzer: Arc<dyn ResumeAnalyzer>, sink: Arc<dyn AnalysisSink>) -> Self {
        Self { analyzer, sink }
    }
}

#[async_trait]
impl JobHandler for AnalyzeResumeHandler {
    fn kind(&self) -> JobKind {
        JobKind::AnalyzeResume
    }

    async fn handle(&self, payload: JobPayload, ctx: &JobContext) -> JobResult<Value> {
        let data = match payload {
            JobPayload::AnalyzeResume(data) => data,
            other => {
                return Err(JobError::PayloadMismatch(format!(
                    "{} handler got {}",
                    self.kind(),
                    other.kind()
                )))
            }
        };

        info!(
            job_id = %ctx.job_id(),
            resume_id = data.resume_id,
            attempt = ctx.attempt(),
            "Processing resume analysis"
        );

        let result = self
            .analyzer
            .analyze(&data.text_content, &data.target_role)
            .await?;
        ctx.progress(50).await;

        self.sink.store(data.resume_id, &result).await?;
        ctx.progress(100).await;

        // The analysis is saved; a lost email must not rerun it
        ctx.manager()
            .queue_analysis_email(AnalysisEmailPayload {
                email: data.email,
                name: data.name,
                analysis_result: result.clone(),
                file_name: RESULT_FILE_NAME.to_string(),
                target_role: data.target_role,
            })
            .await
            .fire_and_forget("analysis follow-up email");

        info!(job_id = %ctx.job_id(), resume_id = data.resume_id, "Resume analysis completed");

        Ok(json!({
            "success": true,
            "analysisResult": result,
        }))
    }
}
