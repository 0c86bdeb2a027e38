//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, SchedulerError>` so
//! that errors are automatically converted to the right HTTP status via
//! the `IntoResponse` implementation on `SchedulerError`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use crate::cron;
use crate::db::{ExecutionStatus, ExecutionType, Job, JobExecution};
use crate::error::SchedulerError;

/// Executions returned per listing request.
const EXECUTION_PAGE_SIZE: i64 = 10;

// ═══════════════════════════════════════════════════════════════════════════
// Health
// ═══════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ═══════════════════════════════════════════════════════════════════════════
// DTOs
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub schedule: String,
    pub api_url: String,
    #[serde(rename = "type")]
    pub execution_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreatedResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecutionResponse {
    pub execution_id: Uuid,
    pub status: String,
    pub scheduled_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub retry_count: i32,
}

impl From<JobExecution> for JobExecutionResponse {
    fn from(execution: JobExecution) -> Self {
        Self {
            execution_id: execution.id,
            status: execution.status,
            scheduled_time: execution.scheduled_time,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            duration_ms: execution.duration_ms,
            status_code: execution.status_code,
            retry_count: execution.retry_count,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Job Handlers
// ═══════════════════════════════════════════════════════════════════════════

/// Register a new job. The first fire time is computed from "now" so an
/// unparseable schedule is rejected before anything is persisted.
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, SchedulerError> {
    info!(
        schedule = %req.schedule,
        api_url = %req.api_url,
        execution_type = %req.execution_type,
        "received job registration"
    );

    if req.api_url.trim().is_empty() {
        return Err(SchedulerError::validation("apiUrl cannot be blank"));
    }

    let execution_type = ExecutionType::parse(&req.execution_type)?;
    let next_execution_time = cron::next_fire_time(&req.schedule, Utc::now())?;

    let job = Job::new(req.schedule, req.api_url, execution_type, next_execution_time);
    state.db.insert_job(&job).await?;

    info!(
        job_id = %job.id,
        next_execution_time = %next_execution_time,
        "created job"
    );

    Ok((
        StatusCode::CREATED,
        Json(JobCreatedResponse { job_id: job.id }),
    ))
}

/// List the most recent executions for a job, newest first.
pub async fn list_job_executions(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, SchedulerError> {
    // Unknown job short-circuits before any execution query runs.
    if !state.db.job_exists(job_id).await? {
        return Err(SchedulerError::job_not_found(job_id));
    }

    let executions = state
        .db
        .recent_executions(job_id, EXECUTION_PAGE_SIZE)
        .await?;

    let response: Vec<JobExecutionResponse> = executions
        .into_iter()
        .map(JobExecutionResponse::from)
        .collect();

    Ok(Json(response))
}

/// List every execution currently waiting to run.
pub async fn pending_executions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, SchedulerError> {
    let executions = state
        .db
        .executions_by_status(ExecutionStatus::Pending)
        .await?;

    let response: Vec<JobExecutionResponse> = executions
        .into_iter()
        .map(JobExecutionResponse::from)
        .collect();

    Ok(Json(response))
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_job_request_wire_shape() {
        let req: CreateJobRequest = serde_json::from_str(
            r#"{"schedule": "0 */5 * * * *", "apiUrl": "http://example.com/hook", "type": "atleast_once"}"#,
        )
        .unwrap();
        assert_eq!(req.schedule, "0 */5 * * * *");
        assert_eq!(req.api_url, "http://example.com/hook");
        assert_eq!(req.execution_type, "atleast_once");
    }

    #[test]
    fn test_job_created_response_wire_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&JobCreatedResponse { job_id: id }).unwrap();
        assert_eq!(json, format!(r#"{{"jobId":"{}"}}"#, id));
    }

    #[test]
    fn test_execution_response_wire_shape() {
        let execution = JobExecution::pending(Uuid::new_v4(), Utc::now(), 2);
        let response = JobExecutionResponse::from(execution.clone());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["executionId"], execution.id.to_string());
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["retryCount"], 2);
        assert!(json["startedAt"].is_null());
        assert!(json["durationMs"].is_null());
    }
}
