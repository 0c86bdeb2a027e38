//! Execution engine: performs a single job callback and records the
//! outcome.
//!
//! Runs on the dispatch pool, concurrently across executions. Every
//! outcome — 200, non-200, transport failure — is persisted onto the
//! execution row; nothing is rethrown past this boundary except the
//! fatal cases where the execution or job row has vanished.

use chrono::Utc;
use metrics::counter;
use reqwest::Method;
use tracing::{error, info};
use uuid::Uuid;

use crate::client::CallbackClient;
use crate::db::{Database, ExecutionStatus};
use crate::error::{Result, SchedulerError};

/// Status code recorded when the callback failed below the HTTP layer.
pub const TRANSPORT_FAILURE_STATUS_CODE: i32 = 500;

/// Executes claimed job callbacks and persists their outcomes.
pub struct ExecutionEngine {
    db: Database,
    client: CallbackClient,
}

impl ExecutionEngine {
    pub fn new(db: Database, client: CallbackClient) -> Self {
        Self { db, client }
    }

    /// Run one execution end to end.
    ///
    /// # Errors
    ///
    /// Fails with a not-found error when the execution or its job has
    /// vanished — fatal for this invocation, no state is mutated.
    pub async fn execute(&self, execution_id: Uuid) -> Result<()> {
        let execution = self
            .db
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| SchedulerError::execution_not_found(execution_id))?;

        let job = self
            .db
            .get_job(execution.job_id)
            .await?
            .ok_or_else(|| SchedulerError::job_not_found(execution.job_id))?;

        info!(
            job_id = %job.id,
            execution_id = %execution_id,
            retry_count = execution.retry_count,
            "starting job execution"
        );

        let started_at = Utc::now();
        self.db
            .mark_execution_running(execution_id, started_at)
            .await?;

        // The execution id doubles as the idempotency key so the callee
        // can deduplicate a retry racing the original delivery.
        let outcome = self
            .client
            .call(&job.api_url, Method::GET, execution_id, None)
            .await;

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0);

        let (status, status_code) = match &outcome {
            Ok(code) if *code == 200 => (ExecutionStatus::Success, *code as i32),
            Ok(code) => (ExecutionStatus::Failed, *code as i32),
            Err(_) => (ExecutionStatus::Failed, TRANSPORT_FAILURE_STATUS_CODE),
        };

        self.db
            .complete_execution(execution_id, status, status_code, completed_at, duration_ms)
            .await?;

        counter!(
            "cadence_job_executions_total",
            "status" => status.as_str(),
        )
        .increment(1);

        match outcome {
            Ok(_) => {
                info!(
                    job_id = %job.id,
                    execution_id = %execution_id,
                    status = status.as_str(),
                    status_code,
                    duration_ms,
                    "completed job execution"
                );
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    execution_id = %execution_id,
                    duration_ms,
                    error = %e,
                    "job execution failed with transport error"
                );
            }
        }

        Ok(())
    }
}
