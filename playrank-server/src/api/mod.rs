//! API Module
//!
//! HTTP API layer of the server.
//! Each submodule handles endpoints for a specific domain.

pub mod artifact;
pub mod error;
pub mod health;
pub mod job;
pub mod owner;
pub mod run;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::Orchestrator;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Orchestrator>,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Run endpoints
        .route(
            "/projects/{project_id}/runs",
            post(run::create_run).get(run::list_runs),
        )
        .route("/projects/{project_id}/runs/execute", post(run::execute_run))
        .route("/projects/{project_id}/runs/{run_id}", get(run::get_run))
        // Artifact endpoints
        .route(
            "/projects/{project_id}/runs/{run_id}/artifacts",
            get(artifact::list_artifacts),
        )
        .route(
            "/projects/{project_id}/runs/{run_id}/artifacts/generate",
            post(artifact::generate_artifacts),
        )
        .route(
            "/projects/{project_id}/runs/{run_id}/artifacts/start",
            post(artifact::start_artifacts),
        )
        // Job endpoints
        .route("/projects/{project_id}/jobs", get(job::list_jobs))
        .route("/projects/{project_id}/jobs/{job_id}", get(job::get_job))
        .route(
            "/projects/{project_id}/jobs/{job_id}/stream",
            get(job::stream_job),
        )
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
