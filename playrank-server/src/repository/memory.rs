//! In-memory repository for tests
//!
//! Mirrors the conditional-update semantics of the Postgres queries and counts
//! every write so tests can assert idempotence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use playrank_core::domain::artifact::{Artifact, NewArtifact};
use playrank_core::domain::job::{Job, JobKind, JobStatus, NewJob, SourceRef};
use playrank_core::domain::project::{Idea, Project};
use playrank_core::domain::score::{IdeaScore, NewIdeaScore};
use uuid::Uuid;

use super::{RepoResult, Repository};

#[derive(Default)]
struct State {
    projects: HashMap<Uuid, Project>,
    ideas: Vec<Idea>,
    jobs: HashMap<Uuid, Job>,
    scores: Vec<IdeaScore>,
    artifacts: Vec<Artifact>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
    writes: AtomicUsize,
    fail_inserts: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_project(&self, owner_id: Uuid, name: &str) -> Project {
        let project = Project {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            constraints: serde_json::json!({ "budgetUsd": 50000, "teamSize": 3 }),
        };
        self.state.lock().projects.insert(project.id, project.clone());
        project
    }

    pub fn seed_idea(&self, project_id: Uuid, title: &str) -> Idea {
        let idea = Idea {
            id: Uuid::new_v4(),
            project_id,
            title: title.to_string(),
            raw_text: format!("{} in more words", title),
        };
        self.state.lock().ideas.push(idea.clone());
        idea
    }

    /// Store a job as-is, bypassing `create_job`
    pub fn put_job(&self, job: Job) {
        self.state.lock().jobs.insert(job.id, job);
    }

    pub fn put_score(&self, score: IdeaScore) {
        self.state.lock().scores.push(score);
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.state.lock().jobs.get(&id).cloned()
    }

    pub fn artifacts_of(&self, job_id: Uuid) -> Vec<Artifact> {
        self.state
            .lock()
            .artifacts
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect()
    }

    /// Number of successful mutating calls so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every output insert fail with a database error
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn check_inserts(&self) -> RepoResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(sqlx::Error::Protocol("simulated insert failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_project(&self, owner_id: Uuid, project_id: Uuid) -> RepoResult<Option<Project>> {
        Ok(self
            .state
            .lock()
            .projects
            .get(&project_id)
            .filter(|p| p.owner_id == owner_id)
            .cloned())
    }

    async fn list_ideas(&self, project_id: Uuid, limit: usize) -> RepoResult<Vec<Idea>> {
        Ok(self
            .state
            .lock()
            .ideas
            .iter()
            .filter(|i| i.project_id == project_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_job(&self, new: NewJob) -> RepoResult<Job> {
        let now = chrono::Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            kind: new.kind,
            project_id: new.project_id,
            owner_id: new.owner_id,
            parent_job_id: new.parent_job_id,
            status: JobStatus::Running,
            model: new.model,
            input_snapshot: new.input_snapshot,
            sources_used: Vec::new(),
            raw_response: None,
            error_type: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.state.lock().jobs.insert(job.id, job.clone());
        self.wrote();
        Ok(job)
    }

    async fn find_job(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        job_id: Uuid,
    ) -> RepoResult<Option<Job>> {
        Ok(self
            .state
            .lock()
            .jobs
            .get(&job_id)
            .filter(|j| j.owner_id == owner_id && j.project_id == project_id)
            .cloned())
    }

    async fn list_jobs(
        &self,
        owner_id: Uuid,
        project_id: Uuid,
        kind: Option<JobKind>,
    ) -> RepoResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .state
            .lock()
            .jobs
            .values()
            .filter(|j| j.owner_id == owner_id && j.project_id == project_id)
            .filter(|j| kind.is_none_or(|k| j.kind == k))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn record_sources(&self, job_id: Uuid, sources: &[SourceRef]) -> RepoResult<bool> {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Running || !job.sources_used.is_empty() {
            return Ok(false);
        }
        job.sources_used = sources.to_vec();
        job.updated_at = chrono::Utc::now();
        drop(state);
        self.wrote();
        Ok(true)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        model: &str,
        raw_response: &serde_json::Value,
    ) -> RepoResult<Option<Job>> {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status == JobStatus::Failed {
            return Ok(None);
        }
        let now = chrono::Utc::now();
        job.status = JobStatus::Completed;
        job.model = Some(model.to_string());
        job.raw_response = Some(raw_response.clone());
        job.error_type = None;
        job.error_message = None;
        job.updated_at = now;
        job.completed_at.get_or_insert(now);
        let job = job.clone();
        drop(state);
        self.wrote();
        Ok(Some(job))
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error_type: &str,
        error_message: &str,
    ) -> RepoResult<Option<Job>> {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Running {
            return Ok(None);
        }
        let now = chrono::Utc::now();
        job.status = JobStatus::Failed;
        job.error_type = Some(error_type.to_string());
        job.error_message = Some(error_message.to_string());
        job.updated_at = now;
        job.completed_at = Some(now);
        let job = job.clone();
        drop(state);
        self.wrote();
        Ok(Some(job))
    }

    async fn mark_completed(&self, job_id: Uuid) -> RepoResult<Option<Job>> {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Running {
            return Ok(None);
        }
        let now = chrono::Utc::now();
        job.status = JobStatus::Completed;
        job.updated_at = now;
        job.completed_at = Some(now);
        let job = job.clone();
        drop(state);
        self.wrote();
        Ok(Some(job))
    }

    async fn count_outputs(&self, job_id: Uuid, kind: JobKind) -> RepoResult<i64> {
        let state = self.state.lock();
        let count = match kind {
            JobKind::Run => state.scores.iter().filter(|s| s.job_id == job_id).count(),
            JobKind::Artifacts => state.artifacts.iter().filter(|a| a.job_id == job_id).count(),
        };
        Ok(count as i64)
    }

    async fn insert_scores(&self, rows: &[NewIdeaScore]) -> RepoResult<Vec<IdeaScore>> {
        self.check_inserts()?;
        let now = chrono::Utc::now();
        let saved: Vec<IdeaScore> = rows
            .iter()
            .map(|row| IdeaScore {
                id: Uuid::new_v4(),
                job_id: row.job_id,
                project_id: row.project_id,
                owner_id: row.owner_id,
                idea_id: row.idea_id,
                scores: row.scores,
                overall: row.overall,
                rationale: row.rationale.clone(),
                citations: row.citations.clone(),
                cost_estimate_usd: row.cost_estimate_usd,
                resource_estimate: row.resource_estimate.clone(),
                created_at: now,
            })
            .collect();
        self.state.lock().scores.extend(saved.iter().cloned());
        self.wrote();
        Ok(saved)
    }

    async fn list_scores(&self, job_id: Uuid) -> RepoResult<Vec<IdeaScore>> {
        let mut scores: Vec<IdeaScore> = self
            .state
            .lock()
            .scores
            .iter()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        scores.sort_by(|a, b| b.overall.total_cmp(&a.overall));
        Ok(scores)
    }

    async fn insert_artifacts(&self, rows: &[NewArtifact]) -> RepoResult<Vec<Artifact>> {
        self.check_inserts()?;
        let now = chrono::Utc::now();
        let saved: Vec<Artifact> = rows
            .iter()
            .map(|row| Artifact {
                id: Uuid::new_v4(),
                job_id: row.job_id,
                run_id: row.run_id,
                project_id: row.project_id,
                owner_id: row.owner_id,
                kind: row.kind,
                content_markdown: row.content_markdown.clone(),
                citations: row.citations.clone(),
                created_at: now,
            })
            .collect();
        self.state.lock().artifacts.extend(saved.iter().cloned());
        self.wrote();
        Ok(saved)
    }

    async fn list_artifacts(&self, run_id: Uuid) -> RepoResult<Vec<Artifact>> {
        let mut artifacts: Vec<Artifact> = self
            .state
            .lock()
            .artifacts
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect();
        // Newest first; rows inserted together keep their insertion order
        artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(artifacts)
    }
}
