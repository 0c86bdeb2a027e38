//! Failure recovery: stale-execution reaping and backoff-driven retry.
//!
//! Two independent periodic tasks over the shared store. The reaper
//! bounds the window in which a crashed worker leaves an execution
//! RUNNING forever; the retrier gives FAILED executions another attempt
//! once their exponential backoff has elapsed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RecoveryConfig, RetryConfig};
use crate::db::{Database, JobExecution};
use crate::error::Result;
use crate::scheduler::dispatch::Dispatcher;

/// Backoff delay before attempt `retry_count + 1`.
///
/// Pure exponential growth, no jitter and no cap; the attempt-count
/// ceiling is the only bound.
pub fn calculate_retry_delay(config: &RetryConfig, retry_count: i32) -> ChronoDuration {
    let delay_ms = config.initial_delay_ms as f64 * config.multiplier.powi(retry_count);
    ChronoDuration::milliseconds(delay_ms as i64)
}

/// Check whether a FAILED execution's backoff window has elapsed.
///
/// Executions still inside their window are left for a later tick. A
/// FAILED row without `completed_at` has no defined window and is never
/// eligible.
pub fn should_retry(execution: &JobExecution, config: &RetryConfig, now: DateTime<Utc>) -> bool {
    let Some(completed_at) = execution.completed_at else {
        return false;
    };
    now > completed_at + calculate_retry_delay(config, execution.retry_count)
}

/// Periodic recovery tasks sharing one configuration.
#[derive(Clone)]
pub struct RecoveryLoop {
    db: Database,
    dispatcher: Dispatcher,
    recovery: RecoveryConfig,
    retry: RetryConfig,
}

impl RecoveryLoop {
    pub fn new(
        db: Database,
        dispatcher: Dispatcher,
        recovery: RecoveryConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            db,
            dispatcher,
            recovery,
            retry,
        }
    }

    /// Run the stale reaper until cancelled.
    pub async fn run_reaper(self, cancel: CancellationToken) {
        info!(
            interval_seconds = self.recovery.reaper_interval_seconds,
            stale_timeout_seconds = self.recovery.stale_timeout_seconds,
            "stale execution reaper started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.recovery.reaper_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reap_stale().await {
                        error!(error = %e, "error detecting stale executions");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("stale execution reaper stopped");
                    break;
                }
            }
        }
    }

    /// Run the failed-execution retrier until cancelled.
    pub async fn run_retrier(self, cancel: CancellationToken) {
        info!(
            interval_seconds = self.recovery.retry_interval_seconds,
            max_attempts = self.retry.max_attempts,
            "failed execution retrier started"
        );

        let mut interval =
            tokio::time::interval(Duration::from_secs(self.recovery.retry_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.retry_failed().await {
                        error!(error = %e, "error retrying failed executions");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("failed execution retrier stopped");
                    break;
                }
            }
        }
    }

    /// Mark RUNNING executions past the stale timeout as FAILED.
    async fn reap_stale(&self) -> Result<()> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::seconds(self.recovery.stale_timeout_seconds);

        let reaped = self.db.reap_stale_executions(cutoff, now).await?;

        if !reaped.is_empty() {
            warn!(count = reaped.len(), "found stale executions, marking as FAILED");
            for execution_id in &reaped {
                warn!(execution_id = %execution_id, "marked stale execution as FAILED");
            }
        }

        Ok(())
    }

    /// Spawn successor executions for FAILED rows whose backoff elapsed.
    async fn retry_failed(&self) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let candidates = self
            .db
            .claim_failed_for_retry(&mut tx, self.retry.max_attempts)
            .await?;

        if candidates.is_empty() {
            tx.commit().await?;
            return Ok(());
        }

        debug!(count = candidates.len(), "failed executions below the attempt ceiling");

        // Post-commit actions, same handoff as the scheduling loop.
        let mut dispatches = Vec::new();

        for parent in &candidates {
            if !should_retry(parent, &self.retry, now) {
                continue;
            }

            let retry_execution =
                JobExecution::pending(parent.job_id, now, parent.retry_count + 1);
            self.db.insert_execution_tx(&mut tx, &retry_execution).await?;

            info!(
                execution_id = %retry_execution.id,
                parent_execution_id = %parent.id,
                job_id = %parent.job_id,
                attempt = retry_execution.retry_count,
                "created retry execution"
            );
            dispatches.push(retry_execution.id);
        }

        tx.commit().await?;

        for execution_id in dispatches {
            self.dispatcher.dispatch(execution_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn failed_execution(completed_secs_ago: i64, retry_count: i32) -> JobExecution {
        let now = Utc::now();
        let mut execution = JobExecution::pending(Uuid::new_v4(), now, retry_count);
        execution.status = "FAILED".to_string();
        execution.completed_at = Some(now - ChronoDuration::seconds(completed_secs_ago));
        execution
    }

    #[test]
    fn test_retry_delay_exponential_growth() {
        let config = RetryConfig::default();
        assert_eq!(calculate_retry_delay(&config, 0).num_milliseconds(), 1000);
        assert_eq!(calculate_retry_delay(&config, 1).num_milliseconds(), 2000);
        assert_eq!(calculate_retry_delay(&config, 2).num_milliseconds(), 4000);
        assert_eq!(calculate_retry_delay(&config, 3).num_milliseconds(), 8000);
    }

    #[test]
    fn test_retry_delay_unbounded() {
        // No cap: only the attempt ceiling limits growth.
        let config = RetryConfig::default();
        assert_eq!(
            calculate_retry_delay(&config, 10).num_milliseconds(),
            1_024_000
        );
    }

    #[test]
    fn test_should_retry_after_backoff_elapsed() {
        let config = RetryConfig::default();
        // Completed 5s ago with retry_count 0: the 1000ms window elapsed.
        assert!(should_retry(&failed_execution(5, 0), &config, Utc::now()));
    }

    #[test]
    fn test_should_not_retry_inside_backoff_window() {
        let config = RetryConfig::default();
        // Completed just now with retry_count 3: the 8s window is open.
        assert!(!should_retry(&failed_execution(0, 3), &config, Utc::now()));
    }

    #[test]
    fn test_should_not_retry_without_completed_at() {
        let config = RetryConfig::default();
        let mut execution = failed_execution(60, 0);
        execution.completed_at = None;
        assert!(!should_retry(&execution, &config, Utc::now()));
    }
}
