//! Run API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use playrank_core::domain::job::Job;
use playrank_core::dto::run::{CreateRun, RunAccepted, RunDetails, RunOutcome};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::Owner;
use crate::service::run_service;

/// POST /projects/{project_id}/runs
/// Create a run and wait for its scores
pub async fn create_run(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateRun>,
) -> ApiResult<(StatusCode, Json<RunOutcome>)> {
    tracing::info!(project_id = %project_id, top_n = req.top_n, "Creating run");
    let outcome = run_service::create_run(&state.engine, owner, project_id, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /projects/{project_id}/runs/execute
/// Create a run and execute it in the background
pub async fn execute_run(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateRun>,
) -> ApiResult<(StatusCode, Json<RunAccepted>)> {
    let accepted = run_service::start_run(&state.engine, owner, project_id, req).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /projects/{project_id}/runs
pub async fn list_runs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Job>>> {
    let runs = run_service::list_runs(&state.engine, owner, project_id).await?;
    Ok(Json(runs))
}

/// GET /projects/{project_id}/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, run_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<RunDetails>> {
    tracing::debug!(run_id = %run_id, "Getting run");
    let details = run_service::get_run(&state.engine, owner, project_id, run_id).await?;
    Ok(Json(details))
}
