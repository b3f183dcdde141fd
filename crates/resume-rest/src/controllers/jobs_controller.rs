//! Job queue REST API controller.

use crate::responses::{created, ApiResult, AppError};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use resume_jobs::{Job, JobId, JobKind, JobOptions, JobPayload, QueueName, QueueStatsReport};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(enqueue_job))
        .route("/jobs/:job_id", get(get_job))
        .route("/queue/stats", get(queue_stats))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of an enqueue request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobRequest {
    pub queue_name: String,
    pub job_type: String,
    pub payload: Value,
    pub priority: Option<u32>,
    pub delay_ms: Option<u64>,
}

/// Response for a queued job.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJobResponse {
    pub job_id: String,
    pub queue_name: QueueName,
    pub job_type: JobKind,
    pub delay_until: DateTime<Utc>,
}

/// Queue statistics with the time they were collected.
#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    #[serde(flatten)]
    pub report: QueueStatsReport,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Handler Functions
// ============================================================================

/// Queue a job.
async fn enqueue_job(
    State(state): State<AppState>,
    body: Result<Json<EnqueueJobRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = body?;

    let queue: QueueName = request.queue_name.parse()?;
    let kind: JobKind = request.job_type.parse()?;
    let payload = JobPayload::from_parts(kind, request.payload)?;

    let mut options = JobOptions::new();
    if let Some(priority) = request.priority {
        options = options.priority(priority);
    }
    if let Some(delay_ms) = request.delay_ms {
        options = options.delay_ms(delay_ms);
    }

    let handle = state.manager.enqueue(queue, payload, options).await?;
    info!(job_id = %handle.id, queue = %queue, job_type = %kind, "Job queued via API");

    Ok(created(EnqueueJobResponse {
        job_id: handle.id.to_string(),
        queue_name: handle.queue_name,
        job_type: handle.job_type,
        delay_until: handle.delay_until,
    }))
}

/// Get a job by ID.
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state
        .manager
        .get_job(&JobId::from(job_id))
        .await
        .map_err(AppError::from)?;
    Ok(Json(job))
}

/// Per-queue and total job counts. Answers 503 with zeroed counts when the
/// store cannot be read.
async fn queue_stats(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.stats.collect().await;
    let status = if report.is_degraded() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(QueueStatsResponse {
            report,
            timestamp: Utc::now(),
        }),
    )
}
