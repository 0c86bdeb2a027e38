//! Database layer for Cadence.
//!
//! Uses PostgreSQL for persistent storage with sqlx. The store is the
//! coordination point for the whole scheduler fleet: cross-instance
//! mutual exclusion lives in the claim query's `FOR UPDATE SKIP LOCKED`,
//! not in any in-process lock.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{Result, SchedulerError};

// ═══════════════════════════════════════════════════════════════════════════
// Domain enums
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a job execution.
///
/// Transitions are monotonic: PENDING → RUNNING → {SUCCESS, FAILED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    /// Check if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::Failed)
    }
}

impl FromStr for ExecutionStatus {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(SchedulerError::internal(format!(
                "unknown execution status in store: {}",
                other
            ))),
        }
    }
}

/// Delivery guarantee requested at registration.
///
/// Persisted for every job but not currently consulted by scheduling,
/// execution, or retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionType {
    AtleastOnce,
    AtmostOnce,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionType::AtleastOnce => "ATLEAST_ONCE",
            ExecutionType::AtmostOnce => "ATMOST_ONCE",
        }
    }

    /// Parse case-insensitively, as accepted on the registration API.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "ATLEAST_ONCE" => Ok(ExecutionType::AtleastOnce),
            "ATMOST_ONCE" => Ok(ExecutionType::AtmostOnce),
            _ => Err(SchedulerError::invalid_execution_type(s)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════════

/// A registered job. `next_execution_time` is the single scheduling
/// cursor; an active job always carries one.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub schedule: String,
    pub api_url: String,
    pub execution_type: String,
    pub is_active: bool,
    pub next_execution_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a new active job ready for insertion.
    pub fn new(
        schedule: impl Into<String>,
        api_url: impl Into<String>,
        execution_type: ExecutionType,
        next_execution_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            schedule: schedule.into(),
            api_url: api_url.into(),
            execution_type: execution_type.as_str().to_string(),
            is_active: true,
            next_execution_time: Some(next_execution_time),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One attempt at delivering a job's callback.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub scheduled_time: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status_code: Option<i32>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobExecution {
    /// Build a fresh PENDING execution ready for insertion.
    pub fn pending(job_id: Uuid, scheduled_time: DateTime<Utc>, retry_count: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            status: ExecutionStatus::Pending.as_str().to_string(),
            scheduled_time,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            status_code: None,
            retry_count,
            created_at: now,
            updated_at: now,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Database
// ═══════════════════════════════════════════════════════════════════════════

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SchedulerError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Job Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a new job.
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, schedule, api_url, execution_type, is_active,
                              next_execution_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(job.id)
        .bind(&job.schedule)
        .bind(&job.api_url)
        .bind(&job.execution_type)
        .bind(job.is_active)
        .bind(job.next_execution_time)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a job by ID.
    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, schedule, api_url, execution_type, is_active,
                   next_execution_time, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Check whether a job exists.
    pub async fn job_exists(&self, job_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM jobs WHERE id = $1)")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    /// Claim every due job, skipping rows locked by concurrent instances.
    ///
    /// Must run inside a caller-held transaction: the row locks taken here
    /// are what keeps other instances from claiming the same jobs, and
    /// they are only released at commit/rollback. Rows already locked by
    /// another instance are silently excluded, never awaited.
    pub async fn claim_due_jobs(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT id, schedule, api_url, execution_type, is_active,
                   next_execution_time, created_at, updated_at
            FROM jobs
            WHERE is_active = TRUE AND next_execution_time <= $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(&mut **tx)
        .await?;

        Ok(jobs)
    }

    /// Advance a claimed job's scheduling cursor.
    pub async fn advance_job(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
        next_execution_time: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET next_execution_time = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(next_execution_time)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Deactivate a job whose schedule can no longer be evaluated.
    pub async fn deactivate_job(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution Operations
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a new execution record.
    pub async fn insert_execution(&self, execution: &JobExecution) -> Result<()> {
        self.insert_execution_with(&self.pool, execution).await
    }

    /// Insert a new execution record inside a caller-held transaction.
    pub async fn insert_execution_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        execution: &JobExecution,
    ) -> Result<()> {
        self.insert_execution_with(&mut **tx, execution).await
    }

    async fn insert_execution_with<'e, E>(&self, executor: E, execution: &JobExecution) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO job_executions (id, job_id, status, scheduled_time, started_at,
                                        completed_at, duration_ms, status_code, retry_count,
                                        created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.job_id)
        .bind(&execution.status)
        .bind(execution.scheduled_time)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(execution.status_code)
        .bind(execution.retry_count)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Get an execution by ID.
    pub async fn get_execution(&self, execution_id: Uuid) -> Result<Option<JobExecution>> {
        let row = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT id, job_id, status, scheduled_time, started_at, completed_at,
                   duration_ms, status_code, retry_count, created_at, updated_at
            FROM job_executions
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Transition an execution to RUNNING.
    pub async fn mark_execution_running(
        &self,
        execution_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET status = $2, started_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .bind(ExecutionStatus::Running.as_str())
        .bind(started_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record an execution's terminal outcome.
    pub async fn complete_execution(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        status_code: i32,
        completed_at: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE job_executions
            SET status = $2, status_code = $3, completed_at = $4,
                duration_ms = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(execution_id)
        .bind(status.as_str())
        .bind(status_code)
        .bind(completed_at)
        .bind(duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark RUNNING executions scheduled before `cutoff` as FAILED.
    ///
    /// Returns the reaped execution ids. A worker crash after RUNNING but
    /// before completion would otherwise leave the row RUNNING forever.
    pub async fn reap_stale_executions(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE job_executions
            SET status = $1, completed_at = $3, updated_at = $3
            WHERE status = $2 AND scheduled_time < $4
            RETURNING id
            "#,
        )
        .bind(ExecutionStatus::Failed.as_str())
        .bind(ExecutionStatus::Running.as_str())
        .bind(now)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Claim FAILED executions still below the attempt ceiling that have
    /// not yet spawned a successor, oldest first.
    ///
    /// Runs inside a caller-held transaction with skip-locked row locks
    /// so concurrent retriers on other instances pass over each other's
    /// candidates. The NOT EXISTS clause enforces the one-successor
    /// invariant: a FAILED execution whose retry has already been created
    /// is never selected again.
    pub async fn claim_failed_for_retry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        max_attempts: i32,
    ) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT je.id, je.job_id, je.status, je.scheduled_time, je.started_at,
                   je.completed_at, je.duration_ms, je.status_code, je.retry_count,
                   je.created_at, je.updated_at
            FROM job_executions je
            WHERE je.status = $1
              AND je.retry_count < $2
              AND NOT EXISTS (
                  SELECT 1 FROM job_executions successor
                  WHERE successor.job_id = je.job_id
                    AND successor.retry_count = je.retry_count + 1
                    AND successor.created_at >= je.completed_at
              )
            ORDER BY je.created_at ASC
            FOR UPDATE OF je SKIP LOCKED
            "#,
        )
        .bind(ExecutionStatus::Failed.as_str())
        .bind(max_attempts)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows)
    }

    /// Get the most recent executions for a job, newest first.
    pub async fn recent_executions(&self, job_id: Uuid, limit: i64) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT id, job_id, status, scheduled_time, started_at, completed_at,
                   duration_ms, status_code, retry_count, created_at, updated_at
            FROM job_executions
            WHERE job_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(job_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Get all executions currently in the given status.
    pub async fn executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query_as::<_, JobExecution>(
            r#"
            SELECT id, job_id, status, scheduled_time, started_at, completed_at,
                   duration_ms, status_code, retry_count, created_at, updated_at
            FROM job_executions
            WHERE status = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_status_roundtrip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Success,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("LIMBO".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_execution_status_terminal() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_execution_type_parse_case_insensitive() {
        assert_eq!(
            ExecutionType::parse("atleast_once").unwrap(),
            ExecutionType::AtleastOnce
        );
        assert_eq!(
            ExecutionType::parse("AtMost_Once").unwrap(),
            ExecutionType::AtmostOnce
        );
        assert!(ExecutionType::parse("EXACTLY_ONCE").is_err());
    }

    #[test]
    fn test_new_job_is_active_with_cursor() {
        let next = Utc::now() + chrono::Duration::minutes(5);
        let job = Job::new("0 */5 * * * *", "http://example.com/hook", ExecutionType::AtleastOnce, next);
        assert!(job.is_active);
        assert_eq!(job.next_execution_time, Some(next));
        assert_eq!(job.execution_type, "ATLEAST_ONCE");
    }

    #[test]
    fn test_pending_execution_defaults() {
        let job_id = Uuid::new_v4();
        let now = Utc::now();
        let execution = JobExecution::pending(job_id, now, 0);
        assert_eq!(execution.status, "PENDING");
        assert_eq!(execution.retry_count, 0);
        assert!(execution.started_at.is_none());
        assert!(execution.completed_at.is_none());
        assert!(execution.status_code.is_none());
    }
}
