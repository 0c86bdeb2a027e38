//! HTTP API for Cadence.
//!
//! REST surface (via Axum) for job registration and execution listing.
//! Scheduling itself never goes through this layer; the periodic loops
//! talk straight to the store.

mod handlers;

pub use handlers::{CreateJobRequest, JobCreatedResponse, JobExecutionResponse};

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::Database;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
}

/// Build the API router.
///
/// # Endpoints
///
/// - `POST /api/v1/jobs` - Register a new job
/// - `GET /api/v1/jobs/:job_id/executions` - Recent executions for a job
/// - `GET /api/v1/jobs/status` - All currently PENDING executions
/// - `GET /health` - Health probe (unversioned)
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/jobs", jobs_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn jobs_router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_job))
        .route("/status", get(handlers::pending_executions))
        .route("/:job_id/executions", get(handlers::list_job_executions))
}
