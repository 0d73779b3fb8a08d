//! Artifact API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use playrank_core::dto::artifact::{
    ArtifactJobAccepted, ArtifactListing, ArtifactOutcome, GenerateArtifacts,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::Owner;
use crate::service::artifact_service;

/// POST /projects/{project_id}/runs/{run_id}/artifacts/generate
pub async fn generate_artifacts(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, run_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GenerateArtifacts>,
) -> ApiResult<(StatusCode, Json<ArtifactOutcome>)> {
    tracing::info!(run_id = %run_id, top_n = req.top_n, "Generating artifacts");
    let outcome = artifact_service::generate(&state.engine, owner, project_id, run_id, req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /projects/{project_id}/runs/{run_id}/artifacts/start
pub async fn start_artifacts(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, run_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<GenerateArtifacts>,
) -> ApiResult<(StatusCode, Json<ArtifactJobAccepted>)> {
    let accepted = artifact_service::start(&state.engine, owner, project_id, run_id, req).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// GET /projects/{project_id}/runs/{run_id}/artifacts
pub async fn list_artifacts(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, run_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ArtifactListing>> {
    let listing = artifact_service::list(&state.engine, owner, project_id, run_id).await?;
    Ok(Json(listing))
}
