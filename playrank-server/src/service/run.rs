//! Run Service
//!
//! Creating, executing and reading scoring runs.

use std::sync::Arc;

use chrono::Utc;
use playrank_core::domain::job::{Job, JobKind, NewJob};
use playrank_core::domain::score::Weights;
use playrank_core::dto::run::{CreateRun, RunAccepted, RunDetails, RunInputSnapshot, RunOutcome};
use uuid::Uuid;

use crate::service::error::ServiceError;
use crate::service::orchestrator::Orchestrator;
use crate::service::reconcile::{reconcile, reconcile_all};
use crate::service::scoring::ScoringPipeline;

pub const MAX_TOP_N: u32 = 20;
pub const MAX_WEIGHT: f64 = 5.0;

fn validate(req: &CreateRun) -> Result<(), ServiceError> {
    if req.top_n == 0 || req.top_n > MAX_TOP_N {
        return Err(ServiceError::Validation(format!(
            "topN must be between 1 and {MAX_TOP_N}"
        )));
    }
    let Weights {
        impact,
        effort,
        risk,
        data_readiness,
    } = req.weights;
    for (name, value) in [
        ("impact", impact),
        ("effort", effort),
        ("risk", risk),
        ("dataReadiness", data_readiness),
    ] {
        if !value.is_finite() || !(0.0..=MAX_WEIGHT).contains(&value) {
            return Err(ServiceError::Validation(format!(
                "weights.{name} must be between 0 and {MAX_WEIGHT}"
            )));
        }
    }
    Ok(())
}

/// Validate the request, snapshot the input and create the run job
pub async fn prepare(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    req: CreateRun,
) -> Result<(Job, ScoringPipeline), ServiceError> {
    validate(&req)?;

    let repo = engine.repo();
    let project = repo
        .find_project(owner_id, project_id)
        .await?
        .ok_or(ServiceError::ProjectNotFound(project_id))?;

    let ideas = repo
        .list_ideas(project_id, engine.settings().max_ideas_per_run)
        .await?;
    if ideas.is_empty() {
        return Err(ServiceError::IdeasEmpty);
    }

    let input = RunInputSnapshot::new(&project, &ideas, req.weights, req.top_n);
    let snapshot = serde_json::to_value(&input)
        .map_err(|e| ServiceError::Internal(format!("snapshot encoding failed: {e}")))?;

    let job = repo
        .create_job(NewJob {
            kind: JobKind::Run,
            project_id,
            owner_id,
            parent_job_id: None,
            model: Some(engine.settings().chat_model.clone()),
            input_snapshot: snapshot,
        })
        .await?;

    tracing::info!(run_id = %job.id, project_id = %project_id, ideas = ideas.len(), "Run created");
    Ok((job, ScoringPipeline::new(input)))
}

/// Create a run and wait for it to finish
pub async fn create_run(
    engine: &Arc<Orchestrator>,
    owner_id: Uuid,
    project_id: Uuid,
    req: CreateRun,
) -> Result<RunOutcome, ServiceError> {
    let (job, pipeline) = prepare(engine, owner_id, project_id, req).await?;
    let (run, top) = engine.run(pipeline, job).await?;
    Ok(RunOutcome { run, top })
}

/// Create a run and return while it executes in the background
pub async fn start_run(
    engine: &Arc<Orchestrator>,
    owner_id: Uuid,
    project_id: Uuid,
    req: CreateRun,
) -> Result<RunAccepted, ServiceError> {
    let (job, pipeline) = prepare(engine, owner_id, project_id, req).await?;
    engine.spawn(pipeline, job.clone());
    Ok(RunAccepted { run: job })
}

/// A run and all of its scores, best first
pub async fn get_run(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
) -> Result<RunDetails, ServiceError> {
    let run = find_run(engine, owner_id, project_id, run_id).await?;
    let scores = engine.repo().list_scores(run.id).await?;
    Ok(RunDetails { run, scores })
}

/// Reconciled run, or `RunNotFound` when it is missing or not a scoring run
pub async fn find_run(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
) -> Result<Job, ServiceError> {
    let job = engine
        .repo()
        .find_job(owner_id, project_id, run_id)
        .await?
        .filter(|j| j.kind == JobKind::Run)
        .ok_or(ServiceError::RunNotFound(run_id))?;

    let live = engine.is_driving(job.id);
    let run = reconcile(
        engine.repo(),
        engine.broker(),
        job,
        engine.settings().stuck_after,
        Utc::now(),
        live,
    )
    .await?;
    Ok(run)
}

/// Runs of a project, newest first
pub async fn list_runs(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
) -> Result<Vec<Job>, ServiceError> {
    let repo = engine.repo();
    repo.find_project(owner_id, project_id)
        .await?
        .ok_or(ServiceError::ProjectNotFound(project_id))?;

    let jobs = repo
        .list_jobs(owner_id, project_id, Some(JobKind::Run))
        .await?;
    let runs = reconcile_all(repo, engine.broker(), jobs, engine.settings().stuck_after, |id| {
        engine.is_driving(id)
    })
    .await?;
    Ok(runs)
}
