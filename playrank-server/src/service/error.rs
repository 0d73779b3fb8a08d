//! Service error type
//!
//! Every failure that can end a job maps to a stable `error_type` string that
//! is stored on the job, sent in the `run.failed` event and returned to HTTP
//! callers. Detail beyond [`ServiceError::public_message`] stays in the logs.

use playrank_client::ClientError;
use thiserror::Error;
use uuid::Uuid;

use crate::retrieval::RetrievalError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("run {0} not found")]
    RunNotFound(Uuid),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("project has no ideas")]
    IdeasEmpty,

    #[error("retrieval returned no evidence")]
    EvidenceEmpty,

    #[error("run has no recorded sources")]
    SourcesMissing,

    #[error("run is not completed")]
    RunNotCompleted,

    #[error("run has no scores")]
    RunHasNoScores,

    #[error("model output rejected: {0}")]
    InvalidOutput(String),

    #[error("model referenced unknown item {0}")]
    UnknownItemReference(Uuid),

    #[error("model referenced item {0} more than once")]
    DuplicateItemReference(Uuid),

    #[error("{0} citation(s) outside the grounding set")]
    InvalidCitation(usize),

    #[error(transparent)]
    Upstream(#[from] ClientError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job stopped making progress")]
    RunStuck,

    #[error("server is shutting down")]
    Shutdown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RetrievalError> for ServiceError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::Embedding(e) => ServiceError::Upstream(e),
            RetrievalError::Database(e) => ServiceError::Database(e),
        }
    }
}

impl ServiceError {
    /// Stable classification string
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::ProjectNotFound(_) => "project_not_found",
            ServiceError::RunNotFound(_) => "run_not_found",
            ServiceError::JobNotFound(_) => "job_not_found",
            ServiceError::Validation(_) => "validation_error",
            ServiceError::IdeasEmpty => "ideas_empty",
            ServiceError::EvidenceEmpty => "evidence_empty",
            ServiceError::SourcesMissing => "sources_missing",
            ServiceError::RunNotCompleted => "run_not_completed",
            ServiceError::RunHasNoScores => "run_has_no_scores",
            ServiceError::InvalidOutput(_) => "invalid_output",
            ServiceError::UnknownItemReference(_) => "unknown_item_reference",
            ServiceError::DuplicateItemReference(_) => "duplicate_item_reference",
            ServiceError::InvalidCitation(_) => "invalid_citation",
            ServiceError::Upstream(e) => e.error_type(),
            ServiceError::Database(_) => "persistence_error",
            ServiceError::RunStuck => "run_stuck",
            ServiceError::Shutdown => "shutdown",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show to end users
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::ProjectNotFound(_) => "Project not found.".to_string(),
            ServiceError::RunNotFound(_) => "Run not found.".to_string(),
            ServiceError::JobNotFound(_) => "Job not found.".to_string(),
            ServiceError::Validation(msg) => msg.clone(),
            ServiceError::IdeasEmpty => "No ideas found for this project.".to_string(),
            ServiceError::EvidenceEmpty => {
                "The playbook has no matching sources; add playbook content first.".to_string()
            }
            ServiceError::SourcesMissing => {
                "No playbook sources are associated with this run.".to_string()
            }
            ServiceError::RunNotCompleted => {
                "Artifacts can only be generated for a completed run.".to_string()
            }
            ServiceError::RunHasNoScores => "The run has no scores.".to_string(),
            ServiceError::InvalidOutput(_) => "The model returned an unusable answer.".to_string(),
            ServiceError::UnknownItemReference(_) => {
                "The model referenced an idea that is not part of this run.".to_string()
            }
            ServiceError::DuplicateItemReference(_) => {
                "The model scored the same idea more than once.".to_string()
            }
            ServiceError::InvalidCitation(_) => {
                "The model cited a source that was not provided.".to_string()
            }
            ServiceError::Upstream(e) => e.public_message().to_string(),
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                "Internal server error.".to_string()
            }
            ServiceError::RunStuck => "The job stopped making progress.".to_string(),
            ServiceError::Shutdown => {
                "The server shut down before the job finished. Please retry.".to_string()
            }
        }
    }
}
