//! Artifact Service
//!
//! Generating and listing the plan and experiment card of a run.

use std::sync::Arc;

use playrank_core::domain::artifact::ArtifactKind;
use playrank_core::domain::job::{Job, JobKind, JobStatus, NewJob};
use playrank_core::dto::artifact::{
    ArtifactInputSnapshot, ArtifactJobAccepted, ArtifactListing, ArtifactOutcome,
    GenerateArtifacts, LatestArtifacts,
};
use playrank_core::dto::run::RunInputSnapshot;
use uuid::Uuid;

use crate::service::error::ServiceError;
use crate::service::orchestrator::Orchestrator;
use crate::service::planning::ArtifactPipeline;
use crate::service::run::find_run;

pub const MAX_TOP_N: u32 = 10;

/// Check the run's preconditions and create the artifact job
pub async fn prepare(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
    req: GenerateArtifacts,
) -> Result<(Job, ArtifactPipeline), ServiceError> {
    if req.top_n == 0 || req.top_n > MAX_TOP_N {
        return Err(ServiceError::Validation(format!(
            "topN must be between 1 and {MAX_TOP_N}"
        )));
    }

    let run = find_run(engine, owner_id, project_id, run_id).await?;
    if run.status != JobStatus::Completed {
        return Err(ServiceError::RunNotCompleted);
    }
    if run.sources_used.is_empty() {
        return Err(ServiceError::SourcesMissing);
    }

    let mut ranked = engine.repo().list_scores(run.id).await?;
    if ranked.is_empty() {
        return Err(ServiceError::RunHasNoScores);
    }
    ranked.truncate(req.top_n as usize);

    // Older snapshots may not decode; the prompt then goes without idea text
    let (constraints, ideas) = match serde_json::from_value::<RunInputSnapshot>(run.input_snapshot.clone()) {
        Ok(input) => (input.project.constraints, input.ideas),
        Err(e) => {
            tracing::warn!(run_id = %run.id, error = %e, "Run input snapshot unreadable");
            (serde_json::Value::Null, Vec::new())
        }
    };

    let snapshot = ArtifactInputSnapshot {
        run_id: run.id,
        top_n: req.top_n,
        top_idea_id: ranked[0].idea_id,
        ranked_idea_ids: ranked.iter().map(|s| s.idea_id).collect(),
    };
    let snapshot = serde_json::to_value(&snapshot)
        .map_err(|e| ServiceError::Internal(format!("snapshot encoding failed: {e}")))?;

    let job = engine
        .repo()
        .create_job(NewJob {
            kind: JobKind::Artifacts,
            project_id,
            owner_id,
            parent_job_id: Some(run.id),
            model: Some(
                run.model
                    .clone()
                    .unwrap_or_else(|| engine.settings().chat_model.clone()),
            ),
            input_snapshot: snapshot,
        })
        .await?;

    tracing::info!(job_id = %job.id, run_id = %run.id, top_n = req.top_n, "Artifact job created");
    Ok((job, ArtifactPipeline::new(run, constraints, ideas, ranked)))
}

/// Generate artifacts and wait for them
pub async fn generate(
    engine: &Arc<Orchestrator>,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
    req: GenerateArtifacts,
) -> Result<ArtifactOutcome, ServiceError> {
    let (job, pipeline) = prepare(engine, owner_id, project_id, run_id, req).await?;
    let (job, generated) = engine.run(pipeline, job).await?;
    Ok(ArtifactOutcome {
        job,
        run_id,
        plan: generated.plan,
        experiment_card: generated.experiment_card,
    })
}

/// Start artifact generation in the background
pub async fn start(
    engine: &Arc<Orchestrator>,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
    req: GenerateArtifacts,
) -> Result<ArtifactJobAccepted, ServiceError> {
    let (job, pipeline) = prepare(engine, owner_id, project_id, run_id, req).await?;
    engine.spawn(pipeline, job.clone());
    Ok(ArtifactJobAccepted { job })
}

pub async fn list(
    engine: &Orchestrator,
    owner_id: Uuid,
    project_id: Uuid,
    run_id: Uuid,
) -> Result<ArtifactListing, ServiceError> {
    let run = find_run(engine, owner_id, project_id, run_id).await?;
    let artifacts = engine.repo().list_artifacts(run.id).await?;

    let latest = LatestArtifacts {
        plan: artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::Plan306090)
            .cloned(),
        experiment_card: artifacts
            .iter()
            .find(|a| a.kind == ArtifactKind::ExperimentCard)
            .cloned(),
    };

    Ok(ArtifactListing {
        run_id: run.id,
        artifacts,
        latest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Repository;
    use crate::service::run::create_run;
    use crate::service::testing::{Fixture, artifacts_answer, scores_answer};
    use playrank_core::domain::event::EventKind;
    use playrank_core::dto::run::{CreateRun, RunOutcome};
    use serde_json::json;

    async fn completed_run(fx: &Fixture) -> RunOutcome {
        let answer = scores_answer(&fx.ideas, |i| {
            vec![json!({ "chunkId": fx.chunks[i % fx.chunks.len()].id, "quote": "q" })]
        });
        fx.chat.push_ok(answer);
        create_run(&fx.engine, fx.owner_id, fx.project.id, CreateRun::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_reuses_run_evidence() {
        let fx = Fixture::new(3, 3);
        let run = completed_run(&fx).await;
        let top = run.top[0].idea_id;

        fx.chat.push_ok(artifacts_answer(
            top,
            vec![
                json!({ "chunkId": fx.chunks[0].id, "quote": "Guidance number 1" }),
                json!({ "chunkId": Uuid::nil(), "quote": "junk" }),
            ],
        ));
        let outcome = generate(&fx.engine, fx.owner_id, fx.project.id, run.run.id, GenerateArtifacts::default())
            .await
            .unwrap();

        assert_eq!(fx.retriever.searches(), 1);
        assert_eq!(outcome.job.status, JobStatus::Completed);
        assert_eq!(outcome.job.parent_job_id, Some(run.run.id));
        assert_eq!(outcome.job.sources_used.len(), run.run.sources_used.len());
        assert_eq!(outcome.plan.kind, ArtifactKind::Plan306090);
        assert_eq!(outcome.plan.citations.len(), 1);
        assert!(outcome.plan.content_markdown.contains("## Sources"));
        assert!(outcome.experiment_card.content_markdown.starts_with("# Experiment Card: "));

        let prompt = fx.chat.last_user_prompt().unwrap();
        assert!(prompt.contains(&format!("experimentCard.ideaId MUST equal {top}")));
        assert!(prompt.contains("Guidance number 1"));
        assert_eq!(fx.repo.artifacts_of(outcome.job.id).len(), 2);
    }

    #[tokio::test]
    async fn test_card_for_wrong_idea_fails_job() {
        let fx = Fixture::new(3, 2);
        let run = completed_run(&fx).await;
        let not_top = run.top.last().unwrap().idea_id;

        fx.chat.push_ok(artifacts_answer(not_top, Vec::new()));
        let (job, pipeline) = prepare(&fx.engine, fx.owner_id, fx.project.id, run.run.id, GenerateArtifacts::default())
            .await
            .unwrap();
        let mut sub = fx.broker.subscribe(job.id);
        let err = fx.engine.run(pipeline, job.clone()).await.unwrap_err();

        assert_eq!(err.error_type(), "invalid_output");
        assert_eq!(fx.repo.job(job.id).unwrap().status, JobStatus::Failed);
        assert!(fx.repo.artifacts_of(job.id).is_empty());

        let mut last = None;
        while let Some(event) = sub.recv().await {
            last = Some(event.kind);
        }
        assert_eq!(last, Some(EventKind::Failed));
    }

    #[tokio::test]
    async fn test_preconditions() {
        let fx = Fixture::new(1, 1);

        let running = fx.bare_job();
        let err = prepare(&fx.engine, fx.owner_id, fx.project.id, running.id, GenerateArtifacts::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "run_not_completed");

        let err = prepare(&fx.engine, fx.owner_id, fx.project.id, Uuid::new_v4(), GenerateArtifacts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RunNotFound(_)));

        let run = completed_run(&fx).await;
        let err = prepare(&fx.engine, fx.owner_id, fx.project.id, run.run.id, GenerateArtifacts { top_n: 11 })
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), "validation_error");
    }

    #[tokio::test]
    async fn test_completed_run_without_sources() {
        let fx = Fixture::new(1, 1);
        let job = fx.bare_job();
        fx.repo.mark_completed(job.id).await.unwrap();

        let err = prepare(&fx.engine, fx.owner_id, fx.project.id, job.id, GenerateArtifacts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SourcesMissing));
    }

    #[tokio::test]
    async fn test_listing_reports_latest_per_kind() {
        let fx = Fixture::new(2, 2);
        let run = completed_run(&fx).await;
        let top = run.top[0].idea_id;

        for _ in 0..2 {
            fx.chat.push_ok(artifacts_answer(top, Vec::new()));
            generate(&fx.engine, fx.owner_id, fx.project.id, run.run.id, GenerateArtifacts::default())
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listing = list(&fx.engine, fx.owner_id, fx.project.id, run.run.id).await.unwrap();
        assert_eq!(listing.artifacts.len(), 4);
        let newest_plan = listing
            .artifacts
            .iter()
            .filter(|a| a.kind == ArtifactKind::Plan306090)
            .max_by_key(|a| a.created_at)
            .unwrap();
        assert_eq!(listing.latest.plan.unwrap().id, newest_plan.id);
        assert!(listing.latest.experiment_card.is_some());
    }
}
