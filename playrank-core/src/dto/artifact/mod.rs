//! Artifact DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::Artifact;
use crate::domain::job::Job;

/// Request to generate artifacts for a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateArtifacts {
    #[serde(default = "default_top_n", alias = "topN")]
    pub top_n: u32,
}

fn default_top_n() -> u32 {
    3
}

impl Default for GenerateArtifacts {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

/// Input snapshot of an artifact-generation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInputSnapshot {
    pub run_id: Uuid,
    pub top_n: u32,
    pub top_idea_id: Uuid,
    pub ranked_idea_ids: Vec<Uuid>,
}

/// Response of a synchronous artifact generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactOutcome {
    pub job: Job,
    pub run_id: Uuid,
    pub plan: Artifact,
    pub experiment_card: Artifact,
}

/// Response of a detached artifact generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactJobAccepted {
    pub job: Job,
}

/// All artifacts of a run, newest first, plus the latest of each kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub run_id: Uuid,
    pub artifacts: Vec<Artifact>,
    pub latest: LatestArtifacts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestArtifacts {
    pub plan: Option<Artifact>,
    pub experiment_card: Option<Artifact>,
}
