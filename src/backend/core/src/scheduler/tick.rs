//! The claim-and-advance scheduling loop.
//!
//! Every tick claims due jobs with skip-locked row locks, creates their
//! PENDING executions and advances each job's cursor inside the same
//! transaction, then — strictly after that transaction commits — hands
//! the new execution ids to the dispatch pool. Dispatching earlier would
//! risk running work whose claim never became durable; dispatching on
//! rollback would run work with no record at all.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cron;
use crate::db::{Database, Job, JobExecution};
use crate::error::Result;
use crate::scheduler::dispatch::Dispatcher;

/// Periodic loop that claims due jobs and schedules their executions.
pub struct SchedulingLoop {
    db: Database,
    dispatcher: Dispatcher,
    interval: Duration,
}

impl SchedulingLoop {
    pub fn new(db: Database, dispatcher: Dispatcher, interval: Duration) -> Self {
        Self {
            db,
            dispatcher,
            interval,
        }
    }

    /// Run until cancelled. Tick errors are logged and swallowed so the
    /// loop's own cadence is never disrupted.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "scheduling loop started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "error in job scheduling tick");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("scheduling loop stopped");
                    break;
                }
            }
        }
    }

    /// One claim-and-advance pass. Public so tests and operational
    /// tooling can drive a tick without the periodic loop.
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let due = self.db.claim_due_jobs(&mut tx, now).await?;

        if due.is_empty() {
            tx.commit().await?;
            return Ok(());
        }

        debug!(count = due.len(), "claimed jobs ready for execution");

        // Post-commit actions: execution ids to dispatch once the claim
        // transaction is durable.
        let mut dispatches: Vec<Uuid> = Vec::with_capacity(due.len());

        for job in &due {
            match self.process_job(&mut tx, job, now).await {
                Ok(execution_id) => {
                    info!(
                        job_id = %job.id,
                        execution_id = %execution_id,
                        "job scheduled for execution"
                    );
                    dispatches.push(execution_id);
                }
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "error processing claimed job");
                }
            }
        }

        tx.commit().await?;

        for execution_id in dispatches {
            self.dispatcher.dispatch(execution_id);
        }

        Ok(())
    }

    /// Create the PENDING execution for a claimed job and move its
    /// cursor forward. A schedule that no longer evaluates deactivates
    /// the job instead of letting it re-fire on every future tick.
    async fn process_job(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job: &Job,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        let execution = JobExecution::pending(job.id, now, 0);
        self.db.insert_execution_tx(tx, &execution).await?;

        match cron::next_fire_time(&job.schedule, now) {
            Ok(next) => {
                self.db.advance_job(tx, job.id, next).await?;
                debug!(job_id = %job.id, next_execution_time = %next, "advanced job cursor");
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    error = %e,
                    "schedule no longer evaluates; deactivating job"
                );
                self.db.deactivate_job(tx, job.id).await?;
            }
        }

        Ok(execution.id)
    }
}
