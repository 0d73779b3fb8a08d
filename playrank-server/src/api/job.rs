//! Job API Handlers
//!
//! Reads and the live progress stream, for jobs of any kind.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use playrank_core::domain::event::ProgressEvent;
use playrank_core::domain::job::Job;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::api::owner::Owner;
use crate::service::job_service;

/// GET /projects/{project_id}/jobs
pub async fn list_jobs(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = job_service::list_jobs(&state.engine, owner, project_id).await?;
    Ok(Json(jobs))
}

/// GET /projects/{project_id}/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, job_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Job>> {
    tracing::debug!(job_id = %job_id, "Getting job");
    let job = job_service::get_job(&state.engine, owner, project_id, job_id).await?;
    Ok(Json(job))
}

fn frame(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.kind.as_str())
        .data(event.to_wire().to_string())
}

/// GET /projects/{project_id}/jobs/{job_id}/stream
///
/// Sends a `run.snapshot` of the persisted job first. A finished job ends the
/// stream there; otherwise live events follow until the job's channel closes.
pub async fn stream_job(
    State(state): State<AppState>,
    Owner(owner): Owner,
    Path((project_id, job_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (job, subscription) = job_service::watch_job(&state.engine, owner, project_id, job_id).await?;
    tracing::info!(job_id = %job_id, status = job.status.as_str(), "Progress stream opened");

    let snapshot = ProgressEvent::snapshot(&job);
    let stream = async_stream::stream! {
        yield Ok(frame(&snapshot));

        if let Some(mut subscription) = subscription {
            while let Some(event) = subscription.recv().await {
                yield Ok(frame(&event));
            }
        }
        tracing::debug!(job_id = %job_id, "Progress stream finished");
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive)))
}
