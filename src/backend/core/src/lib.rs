//! # Cadence Core
//!
//! A distributed cron scheduler for HTTP callbacks. A fleet of identical
//! instances shares one PostgreSQL store; coordination happens entirely
//! at the store layer.
//!
//! ## Architecture
//!
//! - **Scheduling Loop**: claims due jobs with skip-locked row locks,
//!   creates PENDING executions, advances each job's cursor, and
//!   dispatches only after the claim transaction commits
//! - **Execution Engine**: performs the callback with an idempotency key
//!   and records the outcome atomically
//! - **Recovery**: a stale reaper bounds abandoned RUNNING executions and
//!   a retrier re-enqueues failures with exponential backoff
//! - **Dispatch Pool**: bounded workers + bounded queue, non-blocking
//!   submission with explicit rejection

pub mod api;
pub mod client;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod scheduler;

pub use error::{ErrorCode, Result, SchedulerError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{AppState, CreateJobRequest, JobCreatedResponse, JobExecutionResponse};
    pub use crate::client::CallbackClient;
    pub use crate::config::Config;
    pub use crate::cron::next_fire_time;
    pub use crate::db::{Database, ExecutionStatus, ExecutionType, Job, JobExecution};
    pub use crate::error::{ErrorCode, Result, SchedulerError};
    pub use crate::scheduler::{
        calculate_retry_delay, should_retry, DispatchPool, Dispatcher, ExecutionEngine,
        RecoveryLoop, Scheduler, SchedulingLoop,
    };
}
