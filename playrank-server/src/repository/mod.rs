//! Repository Module
//!
//! Data access layer for the server.
//! Each submodule holds the queries for one table as free functions over a
//! `PgPool`; [`PgRepository`] bundles them behind the [`Repository`] trait so
//! the services can run against an in-memory store in tests.

pub mod artifact;
pub mod job;
pub mod project;
pub mod score;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use playrank_core::domain::artifact::{Artifact, NewArtifact};
use playrank_core::domain::job::{Job, JobKind, NewJob, SourceRef};
use playrank_core::domain::project::{Idea, Project};
use playrank_core::domain::score::{IdeaScore, NewIdeaScore};
use sqlx::PgPool;
use uuid::Uuid;

// Re-export for convenience
pub use artifact as artifact_repository;
pub use job as job_repository;
pub use project as project_repository;
pub use score as score_repository;

pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Persistence operations used by the services
///
/// Status transitions are conditional: the `complete`, `fail` and `mark`
/// methods return `None` when the guard did not match and nothing was written.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Option<Project>>;

    /// Ideas of a project, oldest first
    async fn list_ideas(&self, project_id: Uuid, limit: usize) -> RepoResult<Vec<Idea>>;

    async fn create_job(&self, new: NewJob) -> RepoResult<Job>;

    async fn find_job(&self, owner_id: Uuid, project_id: Uuid, job_id: Uuid)
    -> RepoResult<Option<Job>>;

    /// Jobs of a project, newest first
    async fn list_jobs(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        kind: Option<JobKind>,
    ) -> RepoResult<Vec<Job>>;

    /// Record the grounding set; only applies while it is still empty
    async fn record_sources(&self, job_id: Uuid, sources: &[SourceRef]) -> RepoResult<bool>;

    /// Orchestrator completion with audit fields
    ///
    /// Applies to `running` jobs and to jobs the reconciler already marked
    /// `completed`, never to `failed` ones.
    async fn complete_job(
        &self,
        job_id: Uuid,
        model: &str,
        raw_response: &serde_json::Value,
    ) -> RepoResult<Option<Job>>;

    /// Fail a `running` job
    async fn fail_job(
        &self,
        job_id: Uuid,
        error_type: &str,
        error_message: &str,
    ) -> RepoResult<Option<Job>>;

    /// Mark a `running` job completed without audit fields
    async fn mark_completed(&self, job_id: Uuid) -> RepoResult<Option<Job>>;

    /// Output rows already persisted for a job (scores or artifacts)
    async fn count_outputs(&self, job_id: Uuid, kind: JobKind) -> RepoResult<i64>;

    /// Insert all rows atomically
    async fn insert_scores(&self, rows: &[NewIdeaScore]) -> RepoResult<Vec<IdeaScore>>;

    /// Scores of a run, best first
    async fn list_scores(&self, job_id: Uuid) -> RepoResult<Vec<IdeaScore>>;

    /// Insert all rows atomically
    async fn insert_artifacts(&self, rows: &[NewArtifact]) -> RepoResult<Vec<Artifact>>;

    /// Artifacts of a run, newest first
    async fn list_artifacts(&self, run_id: Uuid) -> RepoResult<Vec<Artifact>>;
}

/// Postgres-backed repository
#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Option<Project>> {
        project::find_by_id(&self.pool, owner_id, project_id).await
    }

    async fn list_ideas(&self, project_id: Uuid, limit: usize) -> RepoResult<Vec<Idea>> {
        project::list_ideas(&self.pool, project_id, limit).await
    }

    async fn create_job(&self, new: NewJob) -> RepoResult<Job> {
        job::create(&self.pool, new).await
    }

    async fn find_job(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        job_id: Uuid,
    ) -> RepoResult<Option<Job>> {
        job::find_by_id(&self.pool, owner_id, project_id, job_id).await
    }

    async fn list_jobs(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        kind: Option<JobKind>,
    ) -> RepoResult<Vec<Job>> {
        job::list_by_project(&self.pool, owner_id, project_id, kind).await
    }

    async fn record_sources(&self, job_id: Uuid, sources: &[SourceRef]) -> RepoResult<bool> {
        job::record_sources(&self.pool, job_id, sources).await
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        model: &str,
        raw_response: &serde_json::Value,
    ) -> RepoResult<Option<Job>> {
        job::complete(&self.pool, job_id, model, raw_response).await
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error_type: &str,
        error_message: &str,
    ) -> RepoResult<Option<Job>> {
        job::fail(&self.pool, job_id, error_type, error_message).await
    }

    async fn mark_completed(&self, job_id: Uuid) -> RepoResult<Option<Job>> {
        job::mark_completed(&self.pool, job_id).await
    }

    async fn count_outputs(&self, job_id: Uuid, kind: JobKind) -> RepoResult<i64> {
        match kind {
            JobKind::Run => score::count_by_job(&self.pool, job_id).await,
            JobKind::Artifacts => artifact::count_by_job(&self.pool, job_id).await,
        }
    }

    async fn insert_scores(&self, rows: &[NewIdeaScore]) -> RepoResult<Vec<IdeaScore>> {
        score::insert_many(&self.pool, rows).await
    }

    async fn list_scores(&self, job_id: Uuid) -> RepoResult<Vec<IdeaScore>> {
        score::list_by_job(&self.pool, job_id).await
    }

    async fn insert_artifacts(&self, rows: &[NewArtifact]) -> RepoResult<Vec<Artifact>> {
        artifact::insert_many(&self.pool, rows).await
    }

    async fn list_artifacts(&self, run_id: Uuid) -> RepoResult<Vec<Artifact>> {
        artifact::list_by_run(&self.pool, run_id).await
    }
}
