//! Scoring pipeline
//!
//! Rates every idea of a run on four sub-scores and derives a weighted
//! overall score in `[0, 100]`.

use std::collections::HashSet;

use async_trait::async_trait;
use playrank_core::domain::event::{EventKind, ProgressEvent};
use playrank_core::domain::evidence::EvidenceChunk;
use playrank_core::domain::job::Job;
use playrank_core::domain::score::{
    IdeaScore, NewIdeaScore, SUB_SCORE_MAX, SUB_SCORE_MIN, SubScores, Weights,
};
use playrank_core::dto::model::{ModelScore, ModelScores};
use playrank_core::dto::run::RunInputSnapshot;
use serde_json::{Value, json};

use crate::service::error::ServiceError;
use crate::service::orchestrator::{Grounding, Interpreted, Orchestrator, Pipeline};
use crate::service::prompt::{self, Prompt};

pub const MAX_SCORES: usize = 200;
pub const MAX_RATIONALE_CHARS: usize = 3000;
pub const MAX_SCORE_CITATIONS: usize = 8;

/// Weighted overall score rescaled to `[0, 100]`
///
/// Impact and data readiness count positively, effort and risk negatively.
/// The raw combination is mapped linearly from its bounds given the
/// sub-score range; when those bounds coincide the midpoint is returned.
pub fn overall_score(scores: &SubScores, weights: &Weights) -> f64 {
    let raw = weights.impact * f64::from(scores.impact)
        + weights.data_readiness * f64::from(scores.data_readiness)
        - weights.effort * f64::from(scores.effort)
        - weights.risk * f64::from(scores.risk);

    let lo = f64::from(SUB_SCORE_MIN);
    let hi = f64::from(SUB_SCORE_MAX);
    let positive = weights.impact + weights.data_readiness;
    let negative = weights.effort + weights.risk;
    let max = hi * positive - lo * negative;
    let min = lo * positive - hi * negative;

    if (max - min).abs() < f64::EPSILON {
        return 50.0;
    }
    ((raw - min) / (max - min) * 100.0).clamp(0.0, 100.0)
}

fn check_sub_score(name: &str, value: i32) -> Result<(), ServiceError> {
    if !(SUB_SCORE_MIN..=SUB_SCORE_MAX).contains(&value) {
        return Err(ServiceError::InvalidOutput(format!(
            "{name} must be between {SUB_SCORE_MIN} and {SUB_SCORE_MAX}, got {value}"
        )));
    }
    Ok(())
}

fn check_score(score: &ModelScore) -> Result<(), ServiceError> {
    check_sub_score("impact", score.impact)?;
    check_sub_score("effort", score.effort)?;
    check_sub_score("risk", score.risk)?;
    check_sub_score("dataReadiness", score.data_readiness)?;

    let rationale_len = score.rationale.trim().chars().count();
    if rationale_len == 0 || rationale_len > MAX_RATIONALE_CHARS {
        return Err(ServiceError::InvalidOutput(format!(
            "rationale must be 1..{MAX_RATIONALE_CHARS} characters"
        )));
    }
    if score.citations.len() > MAX_SCORE_CITATIONS {
        return Err(ServiceError::InvalidOutput(format!(
            "at most {MAX_SCORE_CITATIONS} citations per score"
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct ScoringPipeline {
    input: RunInputSnapshot,
}

impl ScoringPipeline {
    pub fn new(input: RunInputSnapshot) -> Self {
        Self { input }
    }
}

#[async_trait]
impl Pipeline for ScoringPipeline {
    type Rows = Vec<NewIdeaScore>;
    type Output = Vec<IdeaScore>;

    async fn gather_evidence(
        &self,
        engine: &Orchestrator,
        job: &Job,
    ) -> Result<Vec<EvidenceChunk>, ServiceError> {
        let chunks = engine
            .retriever()
            .search(
                job.project_id,
                prompt::SCORING_QUERY,
                engine.settings().retrieval_top_k,
            )
            .await?;
        Ok(chunks)
    }

    fn render_prompt(&self, _job: &Job, evidence: &[EvidenceChunk]) -> Prompt {
        prompt::scoring_prompt(&self.input, evidence)
    }

    fn interpret(
        &self,
        job: &Job,
        answer: Value,
        grounding: &Grounding<'_>,
    ) -> Result<Interpreted<Self::Rows>, ServiceError> {
        let parsed: ModelScores = serde_json::from_value(answer)
            .map_err(|e| ServiceError::InvalidOutput(format!("scores do not match schema: {e}")))?;

        if parsed.scores.is_empty() {
            return Err(ServiceError::InvalidOutput("no scores returned".to_string()));
        }
        if parsed.scores.len() > MAX_SCORES {
            return Err(ServiceError::InvalidOutput(format!(
                "more than {MAX_SCORES} scores returned"
            )));
        }

        let known: HashSet<_> = self.input.ideas.iter().map(|i| i.id).collect();
        let mut seen = HashSet::with_capacity(parsed.scores.len());
        let mut rows = Vec::with_capacity(parsed.scores.len());
        let mut dropped = 0;

        for score in parsed.scores {
            if !known.contains(&score.idea_id) {
                return Err(ServiceError::UnknownItemReference(score.idea_id));
            }
            if !seen.insert(score.idea_id) {
                return Err(ServiceError::DuplicateItemReference(score.idea_id));
            }
            check_score(&score)?;

            let filtered = grounding.apply(score.citations)?;
            dropped += filtered.dropped;

            let scores = SubScores {
                impact: score.impact,
                effort: score.effort,
                risk: score.risk,
                data_readiness: score.data_readiness,
            };
            rows.push(NewIdeaScore {
                job_id: job.id,
                project_id: job.project_id,
                owner_id: job.owner_id,
                idea_id: score.idea_id,
                overall: overall_score(&scores, &self.input.weights),
                scores,
                rationale: score.rationale.trim().to_string(),
                citations: filtered.accepted,
                cost_estimate_usd: score.cost_estimate_usd,
                resource_estimate: score.resource_estimate,
            });
        }

        Ok(Interpreted {
            rows,
            dropped_citations: dropped,
        })
    }

    async fn persist(
        &self,
        engine: &Orchestrator,
        job: &Job,
        rows: Self::Rows,
    ) -> Result<Self::Output, ServiceError> {
        let mut saved = engine.repo().insert_scores(&rows).await?;
        tracing::info!(job_id = %job.id, rows = saved.len(), "Scores saved");

        for score in &saved {
            engine.publish(
                ProgressEvent::new(job.id, EventKind::ItemScored).with_payload(json!({
                    "score_id": score.id,
                    "idea_id": score.idea_id,
                    "overall": score.overall,
                })),
            );
        }

        saved.sort_by(|a, b| b.overall.total_cmp(&a.overall));
        saved.truncate(self.input.top_n as usize);
        Ok(saved)
    }
}
