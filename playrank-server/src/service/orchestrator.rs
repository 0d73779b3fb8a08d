//! Run Orchestrator
//!
//! Drives one job through `retrieval -> generating -> persisting -> completed`,
//! or to `failed` from any open stage. The steps are the same for every job
//! kind; a [`Pipeline`] supplies the parts that differ (evidence, prompt,
//! output validation, persistence).
//!
//! Synchronous and detached callers share [`Orchestrator::launch`]: the job
//! always runs on the orchestrator's task tracker, so a caller that goes away
//! never cancels it. Only shutdown does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use playrank_client::ChatModel;
use playrank_core::domain::event::{EventKind, ProgressEvent, RunStage};
use playrank_core::domain::evidence::{Citation, EvidenceChunk};
use playrank_core::domain::job::{Job, SourceRef};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::broker::EventBroker;
use crate::config::Config;
use crate::repository::Repository;
use crate::retrieval::Retriever;
use crate::service::error::ServiceError;
use crate::service::grounding::{Filtered, GroundingSet, GroundingValidator};
use crate::service::prompt::Prompt;

/// Orchestrator settings derived from [`Config`]
#[derive(Debug, Clone)]
pub struct Settings {
    pub chat_model: String,
    pub retrieval_top_k: usize,
    pub max_ideas_per_run: usize,
    pub stuck_after: Duration,
    pub validator: GroundingValidator,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            chat_model: config.chat_model.clone(),
            retrieval_top_k: config.retrieval_top_k,
            max_ideas_per_run: config.max_ideas_per_run,
            stuck_after: config.stuck_job_timeout,
            validator: GroundingValidator::new(config.citation_policy, config.verify_quotes),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Grounding context handed to [`Pipeline::interpret`]
pub struct Grounding<'a> {
    set: &'a GroundingSet,
    validator: GroundingValidator,
}

impl<'a> Grounding<'a> {
    pub fn new(set: &'a GroundingSet, validator: GroundingValidator) -> Self {
        Self { set, validator }
    }

    /// Apply the configured citation policy to one citation list
    pub fn apply(&self, citations: Vec<Citation>) -> Result<Filtered, ServiceError> {
        self.validator.apply(citations, self.set)
    }
}

/// Validated output rows and the number of citations dropped on the way
#[derive(Debug)]
pub struct Interpreted<R> {
    pub rows: R,
    pub dropped_citations: usize,
}

/// The job-specific half of a job
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Rows ready to be written
    type Rows: Send;
    /// What a synchronous caller gets back
    type Output: Send + 'static;

    /// Evidence the job may cite; empty evidence fails the job
    async fn gather_evidence(
        &self,
        engine: &Orchestrator,
        job: &Job,
    ) -> Result<Vec<EvidenceChunk>, ServiceError>;

    fn render_prompt(&self, job: &Job, evidence: &[EvidenceChunk]) -> Prompt;

    /// Check the parsed model answer and turn it into rows
    fn interpret(
        &self,
        job: &Job,
        answer: Value,
        grounding: &Grounding<'_>,
    ) -> Result<Interpreted<Self::Rows>, ServiceError>;

    /// Write the rows and announce each one
    async fn persist(
        &self,
        engine: &Orchestrator,
        job: &Job,
        rows: Self::Rows,
    ) -> Result<Self::Output, ServiceError>;
}

/// Forward-only stage bookkeeping for one job
struct StageTracker {
    job_id: Uuid,
    stage: RunStage,
}

impl StageTracker {
    fn new(job_id: Uuid) -> Self {
        Self {
            job_id,
            stage: RunStage::Created,
        }
    }

    fn advance(&mut self, next: RunStage) {
        if self.stage.can_advance_to(next) {
            tracing::debug!(job_id = %self.job_id, from = self.stage.as_str(), to = next.as_str(), "Stage changed");
            self.stage = next;
        } else {
            tracing::warn!(job_id = %self.job_id, from = self.stage.as_str(), to = next.as_str(), "Ignoring backwards stage change");
        }
    }
}

pub struct Orchestrator {
    repo: Arc<dyn Repository>,
    retriever: Arc<dyn Retriever>,
    chat: Arc<dyn ChatModel>,
    broker: Arc<EventBroker>,
    settings: Settings,
    tracker: TaskTracker,
    /// Jobs this process is driving right now
    active: DashSet<Uuid>,
    draining: CancellationToken,
    cancel: CancellationToken,
}

/// Keeps a job in the active set until dropped
struct ActiveJob<'a> {
    jobs: &'a DashSet<Uuid>,
    job_id: Uuid,
}

impl<'a> ActiveJob<'a> {
    fn enter(jobs: &'a DashSet<Uuid>, job_id: Uuid) -> Self {
        jobs.insert(job_id);
        Self { jobs, job_id }
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.jobs.remove(&self.job_id);
    }
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        retriever: Arc<dyn Retriever>,
        chat: Arc<dyn ChatModel>,
        broker: Arc<EventBroker>,
        settings: Settings,
    ) -> Self {
        Self {
            repo,
            retriever,
            chat,
            broker,
            settings,
            tracker: TaskTracker::new(),
            active: DashSet::new(),
            draining: CancellationToken::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn repo(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    pub fn retriever(&self) -> &dyn Retriever {
        self.retriever.as_ref()
    }

    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether this process is driving `job_id` at the moment
    ///
    /// A driven job owns its terminal transition and its event channel.
    pub fn is_driving(&self, job_id: Uuid) -> bool {
        self.active.contains(&job_id)
    }

    pub fn publish(&self, event: ProgressEvent) {
        self.broker.publish(event);
    }

    fn progress(&self, job_id: Uuid, stage: &str, message: impl Into<String>) {
        self.publish(
            ProgressEvent::new(job_id, EventKind::Progress)
                .with_stage(stage)
                .with_message(message),
        );
    }

    /// Run a job and wait for it to finish
    pub async fn run<P: Pipeline>(
        self: &Arc<Self>,
        pipeline: P,
        job: Job,
    ) -> Result<(Job, P::Output), ServiceError> {
        let job_id = job.id;
        match self.launch(pipeline, job).await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(job_id = %job_id, error = %join_err, "Job task aborted");
                Err(ServiceError::Internal(join_err.to_string()))
            }
        }
    }

    /// Run a job in the background; failures are logged and recorded on the job
    pub fn spawn<P: Pipeline>(self: &Arc<Self>, pipeline: P, job: Job) {
        let job_id = job.id;
        let handle = self.launch(pipeline, job);
        tokio::spawn(async move {
            if let Err(join_err) = handle.await {
                tracing::error!(job_id = %job_id, error = %join_err, "Detached job task aborted");
            }
        });
    }

    fn launch<P: Pipeline>(
        self: &Arc<Self>,
        pipeline: P,
        job: Job,
    ) -> JoinHandle<Result<(Job, P::Output), ServiceError>> {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let job_id = job.id;

            if this.draining.is_cancelled() {
                tracing::warn!(job_id = %job_id, "Job submitted during shutdown");
                this.fail(job_id, &ServiceError::Shutdown).await;
                return Err(ServiceError::Shutdown);
            }

            let _active = ActiveJob::enter(&this.active, job_id);
            let cancel = this.cancel.clone();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ServiceError::Shutdown),
                result = this.execute(&pipeline, job) => result,
            };

            if let Err(ServiceError::Shutdown) = &result {
                this.fail(job_id, &ServiceError::Shutdown).await;
            }
            result
        })
    }

    /// Drive one job through every stage, recording failure on any error
    pub async fn execute<P: Pipeline>(
        &self,
        pipeline: &P,
        job: Job,
    ) -> Result<(Job, P::Output), ServiceError> {
        let job_id = job.id;
        let mut stages = StageTracker::new(job_id);
        tracing::info!(job_id = %job_id, kind = job.kind.as_str(), "Job started");

        match self.drive(pipeline, job, &mut stages).await {
            Ok(done) => {
                stages.advance(RunStage::Completed);
                tracing::info!(job_id = %job_id, "Job completed");
                Ok(done)
            }
            Err(err) => {
                stages.advance(RunStage::Failed);
                self.fail(job_id, &err).await;
                Err(err)
            }
        }
    }

    async fn drive<P: Pipeline>(
        &self,
        pipeline: &P,
        job: Job,
        stages: &mut StageTracker,
    ) -> Result<(Job, P::Output), ServiceError> {
        let job_id = job.id;

        stages.advance(RunStage::Retrieving);
        self.publish(
            ProgressEvent::new(job_id, EventKind::Started)
                .with_stage(RunStage::Created.as_str())
                .with_payload(json!({ "kind": job.kind, "project_id": job.project_id })),
        );
        self.progress(job_id, RunStage::Retrieving.as_str(), "Retrieving playbook sources...");

        let evidence = pipeline.gather_evidence(self, &job).await?;
        if evidence.is_empty() {
            return Err(ServiceError::EvidenceEmpty);
        }

        let sources: Vec<SourceRef> = evidence
            .iter()
            .map(|c| SourceRef {
                chunk_id: c.id,
                title: c.title.clone(),
                similarity: c.similarity,
            })
            .collect();
        if !self.repo.record_sources(job_id, &sources).await? {
            tracing::debug!(job_id = %job_id, "Sources already recorded");
        }
        self.publish(
            ProgressEvent::new(job_id, EventKind::SourcesReady)
                .with_stage("sources_ready")
                .with_message(format!("Sources ready: {} chunks.", sources.len()))
                .with_payload(json!({ "count": sources.len() })),
        );

        let prompt = pipeline.render_prompt(&job, &evidence);
        let model = job
            .model
            .clone()
            .unwrap_or_else(|| self.settings.chat_model.clone());

        stages.advance(RunStage::Generating);
        self.progress(job_id, RunStage::Generating.as_str(), "Calling the model...");

        let completion = self.chat.complete(&prompt.system, &prompt.user, &model).await?;
        let answer: Value = serde_json::from_str(&completion.content)
            .map_err(|e| ServiceError::InvalidOutput(format!("response is not JSON: {e}")))?;
        if !answer.is_object() {
            return Err(ServiceError::InvalidOutput(
                "response is not a JSON object".to_string(),
            ));
        }

        let set = GroundingSet::from_chunks(&evidence);
        let grounding = Grounding::new(&set, self.settings.validator);
        let interpreted = pipeline.interpret(&job, answer.clone(), &grounding)?;

        let dropped = interpreted.dropped_citations;
        if dropped > 0 {
            tracing::warn!(job_id = %job_id, dropped, "Dropped ungrounded citations");
            self.publish(
                ProgressEvent::new(job_id, EventKind::Progress)
                    .with_stage("citations_filtered")
                    .with_message(format!(
                        "{} citation{} filtered",
                        dropped,
                        if dropped == 1 { "" } else { "s" }
                    ))
                    .with_payload(json!({ "dropped": dropped })),
            );
        }

        stages.advance(RunStage::Persisting);
        self.progress(job_id, RunStage::Persisting.as_str(), "Saving results...");

        let output = pipeline.persist(self, &job, interpreted.rows).await?;

        let completed = self
            .repo
            .complete_job(job_id, &completion.model, &answer)
            .await?
            .ok_or(ServiceError::RunStuck)?;

        self.publish(
            ProgressEvent::new(job_id, EventKind::Completed)
                .with_stage(RunStage::Completed.as_str())
                .with_payload(json!({ "status": completed.status, "kind": completed.kind })),
        );
        self.broker.close(job_id);

        Ok((completed, output))
    }

    /// Record the failure, announce it and release the job's channel
    async fn fail(&self, job_id: Uuid, err: &ServiceError) {
        tracing::error!(job_id = %job_id, error_type = err.error_type(), error = %err, "Job failed");

        match self
            .repo
            .fail_job(job_id, err.error_type(), &err.public_message())
            .await
        {
            Ok(Some(_)) => {
                self.publish(
                    ProgressEvent::new(job_id, EventKind::Failed)
                        .with_stage(RunStage::Failed.as_str())
                        .with_message(err.public_message())
                        .with_payload(json!({
                            "status": "failed",
                            "error_type": err.error_type(),
                        })),
                );
            }
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "Job was already terminal, failure not recorded");
            }
            Err(db_err) => {
                tracing::error!(job_id = %job_id, error = %db_err, "Failed to record job failure");
                self.publish(
                    ProgressEvent::new(job_id, EventKind::Failed)
                        .with_stage(RunStage::Failed.as_str())
                        .with_message(err.public_message())
                        .with_payload(json!({
                            "status": "failed",
                            "error_type": err.error_type(),
                        })),
                );
            }
        }
        self.broker.close(job_id);
    }

    /// Wait up to `grace` for running jobs, then cancel the rest
    pub async fn shutdown(&self, grace: Duration) {
        self.draining.cancel();
        self.tracker.close();

        tracing::info!(running = self.tracker.len(), "Waiting for jobs to finish");
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(running = self.tracker.len(), "Grace period over, cancelling jobs");
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        tracing::info!("All jobs stopped");

        // Streams of jobs driven elsewhere would otherwise never end
        self.broker.close_all();
    }
}
