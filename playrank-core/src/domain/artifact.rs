//! Artifact domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::evidence::Citation;

/// A user-facing document generated from a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    /// The artifact-generation job that produced this document
    pub job_id: Uuid,
    /// The scoring run the document summarizes
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub kind: ArtifactKind,
    pub content_markdown: String,
    pub citations: Vec<Citation>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// An artifact row ready to be inserted
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub job_id: Uuid,
    pub run_id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub kind: ArtifactKind,
    pub content_markdown: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "plan_30_60_90")]
    Plan306090,
    #[serde(rename = "experiment_card")]
    ExperimentCard,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Plan306090 => "plan_30_60_90",
            ArtifactKind::ExperimentCard => "experiment_card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plan_30_60_90" => Some(ArtifactKind::Plan306090),
            "experiment_card" => Some(ArtifactKind::ExperimentCard),
            _ => None,
        }
    }
}
