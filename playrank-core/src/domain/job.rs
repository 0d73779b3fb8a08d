//! Job domain types
//!
//! A job is one execution of either the scoring pipeline (a "run") or the
//! artifact-generation pipeline. Jobs are created `Running` by the HTTP layer and
//! move to exactly one terminal status.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job execution record
///
/// Structure shared between the repository (persists) and the orchestrator (drives).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    /// For artifact jobs, the run whose evidence and scores they summarize
    pub parent_job_id: Option<Uuid>,
    pub status: JobStatus,
    pub model: Option<String>,
    pub input_snapshot: serde_json::Value,
    /// Evidence retrieved for this job; empty until retrieval succeeds
    pub sources_used: Vec<SourceRef>,
    pub raw_response: Option<serde_json::Value>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    /// Chunk ids of the grounding set recorded on this job
    pub fn source_ids(&self) -> Vec<Uuid> {
        self.sources_used.iter().map(|s| s.chunk_id).collect()
    }
}

/// A job ready to be inserted in `Running` state
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: JobKind,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub parent_job_id: Option<Uuid>,
    pub model: Option<String>,
    pub input_snapshot: serde_json::Value,
}

/// Which pipeline a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Run,
    Artifacts,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Run => "run",
            JobKind::Artifacts => "artifacts",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "run" => Some(JobKind::Run),
            "artifacts" => Some(JobKind::Artifacts),
            _ => None,
        }
    }
}

/// Durable job status
///
/// Intermediate pipeline stages are never persisted; they only exist as progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Reference to a retrieved evidence chunk, recorded on the job for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub chunk_id: Uuid,
    pub title: Option<String>,
    pub similarity: Option<f64>,
}
