//! Score domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::evidence::Citation;

/// Lowest value the model may assign to a sub-score
pub const SUB_SCORE_MIN: i32 = 1;
/// Highest value the model may assign to a sub-score
pub const SUB_SCORE_MAX: i32 = 10;

/// Weights used to combine sub-scores into an overall score
///
/// Impact and data readiness count positively, effort and risk negatively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_weight")]
    pub impact: f64,
    #[serde(default = "default_weight")]
    pub effort: f64,
    #[serde(default = "default_weight")]
    pub risk: f64,
    #[serde(default = "default_weight", alias = "dataReadiness")]
    pub data_readiness: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            impact: 1.0,
            effort: 1.0,
            risk: 1.0,
            data_readiness: 1.0,
        }
    }
}

/// The four sub-scores the model assigns to an idea
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub impact: i32,
    pub effort: i32,
    pub risk: i32,
    pub data_readiness: i32,
}

/// Rough resource estimate, in person-days
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    #[serde(default, alias = "feDays", skip_serializing_if = "Option::is_none")]
    pub fe_days: Option<i32>,
    #[serde(default, alias = "beDays", skip_serializing_if = "Option::is_none")]
    pub be_days: Option<i32>,
    #[serde(default, alias = "dsDays", skip_serializing_if = "Option::is_none")]
    pub ds_days: Option<i32>,
}

/// A persisted score row, one per idea per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaScore {
    pub id: Uuid,
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub idea_id: Uuid,
    #[serde(flatten)]
    pub scores: SubScores,
    /// Weighted combination rescaled to 0..=100
    pub overall: f64,
    pub rationale: String,
    pub citations: Vec<Citation>,
    pub cost_estimate_usd: Option<i64>,
    pub resource_estimate: ResourceEstimate,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A score row ready to be inserted
#[derive(Debug, Clone)]
pub struct NewIdeaScore {
    pub job_id: Uuid,
    pub project_id: Uuid,
    pub owner_id: Uuid,
    pub idea_id: Uuid,
    pub scores: SubScores,
    pub overall: f64,
    pub rationale: String,
    pub citations: Vec<Citation>,
    pub cost_estimate_usd: Option<i64>,
    pub resource_estimate: ResourceEstimate,
}
