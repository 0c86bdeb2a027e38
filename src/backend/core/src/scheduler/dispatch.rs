//! Bounded dispatch pool for job executions.
//!
//! Two semaphores bound the pool: worker permits cap concurrent
//! executions, queue slots cap submissions waiting for a worker. A
//! submission holds its queue slot only until a worker permit is
//! acquired. Submission itself never blocks: when every queue slot is
//! taken the submission is rejected and the caller's tick moves on —
//! the execution row stays PENDING for a later recovery pass.

use metrics::counter;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::scheduler::engine::ExecutionEngine;

/// Bounded worker pool decoupling execution from the periodic loops.
pub struct DispatchPool {
    workers: Arc<Semaphore>,
    queue_slots: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl DispatchPool {
    /// Create a pool sized from executor configuration.
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            workers: Arc::new(Semaphore::new(config.max_pool_size)),
            queue_slots: Arc::new(Semaphore::new(config.queue_capacity)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Submit work for an execution. Fire-and-forget: returns `true` if
    /// the work was accepted, `false` if the queue is saturated.
    pub fn submit<F>(&self, execution_id: Uuid, work: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let slot = match self.queue_slots.clone().try_acquire_owned() {
            Ok(slot) => slot,
            Err(_) => {
                warn!(
                    execution_id = %execution_id,
                    "dispatch queue saturated; rejecting submission"
                );
                counter!("cadence_dispatch_rejected_total").increment(1);
                return false;
            }
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let workers = self.workers.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            match workers.acquire_owned().await {
                Ok(_permit) => {
                    // Queued no longer: free the slot for the next submission.
                    drop(slot);
                    if let Err(e) = work.await {
                        error!(
                            execution_id = %execution_id,
                            error = %e,
                            "dispatched execution failed"
                        );
                    }
                }
                Err(_) => {
                    error!(execution_id = %execution_id, "worker pool closed; dropping execution");
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        true
    }

    /// Number of accepted submissions not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait up to `grace` for in-flight work to finish.
    ///
    /// Returns `true` when the pool drained, `false` on timeout — the
    /// caller force-stops and the stale reaper reconciles whatever was
    /// still RUNNING.
    pub async fn drain(&self, grace: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + grace;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

/// Pool plus engine: the handle the periodic loops dispatch through.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<DispatchPool>,
    engine: Arc<ExecutionEngine>,
}

impl Dispatcher {
    pub fn new(pool: Arc<DispatchPool>, engine: Arc<ExecutionEngine>) -> Self {
        Self { pool, engine }
    }

    /// Hand an execution id to the pool. Fire-and-forget.
    pub fn dispatch(&self, execution_id: Uuid) -> bool {
        let engine = self.engine.clone();
        self.pool
            .submit(execution_id, async move { engine.execute(execution_id).await })
    }

    pub fn pool(&self) -> &Arc<DispatchPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;

    fn pool(max_workers: usize, queue: usize) -> DispatchPool {
        DispatchPool::new(&ExecutorConfig {
            core_pool_size: 1,
            max_pool_size: max_workers,
            queue_capacity: queue,
            shutdown_grace_seconds: 1,
        })
    }

    #[tokio::test]
    async fn test_submit_runs_work() {
        let pool = pool(2, 2);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let accepted = pool.submit(Uuid::new_v4(), async move {
            let _ = tx.send(());
            Ok(())
        });
        assert!(accepted);
        rx.await.unwrap();
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_rejects_when_queue_saturated() {
        let pool = pool(1, 1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // First submission occupies the single worker.
        assert!(pool.submit(Uuid::new_v4(), async move {
            let _ = release_rx.await;
            Ok(())
        }));
        // Give the spawned task a moment to move from the queue to the worker.
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Second submission sits in the queue slot.
        assert!(pool.submit(Uuid::new_v4(), async { Ok(()) }));
        // Third has neither a worker nor a queue slot.
        assert!(!pool.submit(Uuid::new_v4(), async { Ok(()) }));

        let _ = release_tx.send(());
        assert!(pool.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_drain_times_out_on_stuck_work() {
        let pool = pool(1, 1);
        assert!(pool.submit(Uuid::new_v4(), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }));
        assert!(!pool.drain(Duration::from_millis(100)).await);
        assert_eq!(pool.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_failed_work_still_settles() {
        let pool = pool(1, 1);
        assert!(pool.submit(Uuid::new_v4(), async {
            Err(SchedulerError::internal("boom"))
        }));
        assert!(pool.drain(Duration::from_secs(1)).await);
        assert_eq!(pool.in_flight(), 0);
    }
}
