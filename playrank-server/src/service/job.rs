//! Job Service
//!
//! Kind-agnostic job reads. Every read goes through the reconciler.

use chrono::Utc;
use playrank_core::domain::job::Job;
use uuid::Uuid;

use crate::broker::Subscription;
use crate::service::error::ServiceError;
use crate::service::orchestrator::Orchestrator;
use crate::service::reconcile::{reconcile, reconcile_all};

pub async fn get_job(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    job_id: Uuid,
) -> Result<Job, ServiceError> {
    let job = engine
        .repo()
        .find_job(owner_id, project_id, job_id)
        .await?
        .ok_or(ServiceError::JobNotFound(job_id))?;

    let live = engine.is_driving(job.id);
    let job = reconcile(
        engine.repo(),
        engine.broker(),
        job,
        engine.settings().stuck_after,
        Utc::now(),
        live,
    )
    .await?;
    Ok(job)
}

pub async fn list_jobs(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<Job>, ServiceError> {
    let repo = engine.repo();
    repo.find_project(owner_id, project_id)
        .await?
        .ok_or(ServiceError::ProjectNotFound(project_id))?;

    let jobs = repo.list_jobs(owner_id, project_id, None).await?;
    let jobs = reconcile_all(repo, engine.broker(), jobs, engine.settings().stuck_after, |id| {
        engine.is_driving(id)
    })
    .await?;
    Ok(jobs)
}

/// Subscribe to a job's events, then read its reconciled state
///
/// The subscription is registered before the read so no event published in
/// between is lost. A terminal job gets no subscription.
pub async fn watch_job(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    job_id: Uuid,
) -> Result<(Job, Option<Subscription>), ServiceError> {
    let subscription = engine.broker().subscribe(job_id);
    let job = get_job(engine, owner_id, project_id, job_id).await?;

    if job.status.is_terminal() {
        drop(subscription);
        return Ok((job, None));
    }
    Ok((job, Some(subscription)))
}
