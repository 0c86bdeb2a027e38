//! Scheduler subsystems: claim-and-advance loop, bounded dispatch,
//! execution engine, and failure recovery.
//!
//! All instances of the fleet run the same three periodic tasks; the
//! store's skip-locked claims make that safe.

pub mod dispatch;
pub mod engine;
pub mod recovery;
pub mod tick;

pub use dispatch::{DispatchPool, Dispatcher};
pub use engine::{ExecutionEngine, TRANSPORT_FAILURE_STATUS_CODE};
pub use recovery::{calculate_retry_delay, should_retry, RecoveryLoop};
pub use tick::SchedulingLoop;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::CallbackClient;
use crate::config::Config;
use crate::db::Database;

/// Running scheduler: the three periodic tasks plus the dispatch pool
/// they feed.
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    pool: Arc<DispatchPool>,
    shutdown_grace: Duration,
}

impl Scheduler {
    /// Start the scheduling loop, stale reaper, and retrier.
    pub fn start(db: Database, client: CallbackClient, config: &Config) -> Self {
        let pool = Arc::new(DispatchPool::new(&config.executor));
        let engine = Arc::new(ExecutionEngine::new(db.clone(), client));
        let dispatcher = Dispatcher::new(pool.clone(), engine);

        let cancel = CancellationToken::new();

        let scheduling = SchedulingLoop::new(
            db.clone(),
            dispatcher.clone(),
            Duration::from_millis(config.scheduler.tick_interval_ms),
        );
        let recovery = RecoveryLoop::new(
            db,
            dispatcher,
            config.recovery.clone(),
            config.retry.clone(),
        );

        let handles = vec![
            tokio::spawn(scheduling.run(cancel.clone())),
            tokio::spawn(recovery.clone().run_reaper(cancel.clone())),
            tokio::spawn(recovery.run_retrier(cancel.clone())),
        ];

        Self {
            cancel,
            handles,
            pool,
            shutdown_grace: Duration::from_secs(config.executor.shutdown_grace_seconds),
        }
    }

    /// Stop the periodic loops, then drain in-flight dispatch work up to
    /// the configured grace period.
    pub async fn shutdown(self) {
        info!("stopping scheduler loops");
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }

        if self.pool.drain(self.shutdown_grace).await {
            info!("dispatch pool drained");
        } else {
            // Whatever is still RUNNING will be reconciled by the stale
            // reaper on a surviving instance.
            warn!(
                in_flight = self.pool.in_flight(),
                "dispatch pool drain timed out; abandoning in-flight executions"
            );
        }
    }
}
