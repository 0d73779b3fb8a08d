//! Structured output expected from the external model
//!
//! These types only describe the JSON shape. Range checks and cross-references
//! against the job input are done by the orchestrator after parsing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::evidence::Citation;
use crate::domain::score::ResourceEstimate;

/// `{ "scores": [...] }` returned by the scoring prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelScores {
    pub scores: Vec<ModelScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelScore {
    pub idea_id: Uuid,
    pub impact: i32,
    pub effort: i32,
    pub risk: i32,
    pub data_readiness: i32,
    pub rationale: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub cost_estimate_usd: Option<i64>,
    #[serde(default)]
    pub resource_estimate: ResourceEstimate,
}

/// `{ "plan": {...}, "experimentCard": {...} }` returned by the artifact prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArtifacts {
    pub plan: ModelPlan,
    pub experiment_card: ModelExperimentCard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPlan {
    pub title: String,
    pub days30: Vec<String>,
    pub days60: Vec<String>,
    pub days90: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelExperimentCard {
    pub idea_id: Uuid,
    pub title: String,
    pub problem: String,
    pub hypothesis: String,
    pub dataset: String,
    pub metrics: Vec<String>,
    pub go_no_go: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}
