//! Run DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::Job;
use crate::domain::project::{Idea, Project};
use crate::domain::score::{IdeaScore, Weights};

/// Prompt template version recorded in every input snapshot
pub const PROMPT_VERSION: &str = "v1";

/// Request to create a scoring run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRun {
    #[serde(default = "default_top_n", alias = "topN")]
    pub top_n: u32,
    #[serde(default)]
    pub weights: Weights,
}

fn default_top_n() -> u32 {
    5
}

impl Default for CreateRun {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            weights: Weights::default(),
        }
    }
}

/// Immutable copy of the run input, captured when the job is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInputSnapshot {
    pub project: ProjectSnapshot,
    pub ideas: Vec<IdeaSnapshot>,
    pub weights: Weights,
    pub top_n: u32,
    pub prompt_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub id: Uuid,
    pub name: String,
    pub constraints: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdeaSnapshot {
    pub id: Uuid,
    pub title: String,
    pub text: String,
}

impl RunInputSnapshot {
    pub fn new(project: &Project, ideas: &[Idea], weights: Weights, top_n: u32) -> Self {
        Self {
            project: ProjectSnapshot {
                id: project.id,
                name: project.name.clone(),
                constraints: project.constraints.clone(),
            },
            ideas: ideas
                .iter()
                .map(|i| IdeaSnapshot {
                    id: i.id,
                    title: i.title.clone(),
                    text: i.raw_text.clone(),
                })
                .collect(),
            weights,
            top_n,
            prompt_version: PROMPT_VERSION.to_string(),
        }
    }
}

/// Response of a synchronous run: the job and its best-scoring ideas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run: Job,
    pub top: Vec<IdeaScore>,
}

/// Response of a detached run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run: Job,
}

/// A run with all of its score rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetails {
    pub run: Job,
    pub scores: Vec<IdeaScore>,
}
