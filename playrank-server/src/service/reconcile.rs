//! Self-healing reads
//!
//! A job left `running` by a process that died is repaired the next time
//! somebody reads it. Jobs this process is still driving are left to their
//! orchestrator, which owns their terminal transition and event channel.
//! Every repair is a conditional update on `status = 'running'`, so an
//! orchestrator elsewhere completing the same job wins and repeated reads
//! write nothing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use playrank_core::domain::event::{EventKind, ProgressEvent, RunStage};
use playrank_core::domain::job::{Job, JobStatus};
use serde_json::json;
use uuid::Uuid;

use crate::broker::EventBroker;
use crate::repository::{RepoResult, Repository};

const STUCK_MESSAGE: &str = "The job stopped making progress and was marked as failed.";

/// Repair a `running` job that has output or has been silent for too long
///
/// `live` says whether this process is driving the job; such a job is
/// returned untouched.
pub async fn reconcile(
    repo: &dyn Repository,
    broker: &EventBroker,
    job: Job,
    stuck_after: Duration,
    now: DateTime<Utc>,
    live: bool,
) -> RepoResult<Job> {
    if job.status != JobStatus::Running {
        return Ok(job);
    }
    if live {
        tracing::debug!(job_id = %job.id, "Job is driven here, skipping repair");
        return Ok(job);
    }

    let outputs = repo.count_outputs(job.id, job.kind).await?;
    let repaired = if outputs > 0 {
        let updated = repo.mark_completed(job.id).await?;
        if let Some(done) = &updated {
            tracing::info!(job_id = %done.id, outputs, "Repaired job with output to completed");
            broker.publish(
                ProgressEvent::new(done.id, EventKind::Completed)
                    .with_stage(RunStage::Completed.as_str())
                    .with_payload(json!({ "status": done.status, "repaired": true })),
            );
        }
        updated
    } else if is_stale(&job, stuck_after, now) {
        let updated = repo.fail_job(job.id, "run_stuck", STUCK_MESSAGE).await?;
        if let Some(failed) = &updated {
            tracing::warn!(job_id = %failed.id, created_at = %failed.created_at, "Repaired stuck job to failed");
            broker.publish(
                ProgressEvent::new(failed.id, EventKind::Failed)
                    .with_stage(RunStage::Failed.as_str())
                    .with_message(STUCK_MESSAGE)
                    .with_payload(json!({ "status": failed.status, "error_type": "run_stuck" })),
            );
        }
        updated
    } else {
        return Ok(job);
    };

    match repaired {
        Some(updated) => {
            broker.close(updated.id);
            Ok(updated)
        }
        // Someone else finished it first
        None => Ok(repo
            .find_job(job.owner_id, job.project_id, job.id)
            .await?
            .unwrap_or(job)),
    }
}

fn is_stale(job: &Job, stuck_after: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(job.created_at);
    age.to_std().is_ok_and(|age| age > stuck_after)
}

/// Reconcile every job of a listing
pub async fn reconcile_all(
    repo: &dyn Repository,
    broker: &EventBroker,
    jobs: Vec<Job>,
    stuck_after: Duration,
    is_live: impl Fn(Uuid) -> bool,
) -> RepoResult<Vec<Job>> {
    let now = Utc::now();
    let mut out = Vec::with_capacity(jobs.len());
    for job in jobs {
        let live = is_live(job.id);
        out.push(reconcile(repo, broker, job, stuck_after, now, live).await?);
    }
    Ok(out)
}
