//! Artifact pipeline
//!
//! Turns a completed run into two documents: a 30-60-90 day plan for the top
//! ideas and an experiment card for the best one. The evidence is the run's
//! own grounding set, fetched by id rather than searched again.

use async_trait::async_trait;
use playrank_core::domain::artifact::{Artifact, ArtifactKind, NewArtifact};
use playrank_core::domain::event::{EventKind, ProgressEvent};
use playrank_core::domain::evidence::{Citation, EvidenceChunk};
use playrank_core::domain::job::Job;
use playrank_core::domain::score::IdeaScore;
use playrank_core::dto::model::{ModelArtifacts, ModelExperimentCard, ModelPlan};
use playrank_core::dto::run::IdeaSnapshot;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::service::error::ServiceError;
use crate::service::orchestrator::{Grounding, Interpreted, Orchestrator, Pipeline};
use crate::service::prompt::{self, Prompt, RankedIdea};

const MAX_PLAN_TITLE: usize = 120;
const MAX_CARD_TITLE: usize = 160;
const MAX_PLAN_ITEM: usize = 200;
const MAX_PROBLEM: usize = 800;
const MAX_HYPOTHESIS: usize = 500;
const MAX_DATASET: usize = 800;
const MAX_ARTIFACT_CITATIONS: usize = 10;

/// The two documents produced by one artifact job
#[derive(Debug, Clone)]
pub struct GeneratedArtifacts {
    pub plan: Artifact,
    pub experiment_card: Artifact,
}

#[derive(Debug)]
pub struct ArtifactPipeline {
    run: Job,
    constraints: Value,
    ideas: Vec<IdeaSnapshot>,
    ranked: Vec<IdeaScore>,
}

impl ArtifactPipeline {
    /// `ranked` must be sorted best first and non-empty
    pub fn new(run: Job, constraints: Value, ideas: Vec<IdeaSnapshot>, ranked: Vec<IdeaScore>) -> Self {
        Self {
            run,
            constraints,
            ideas,
            ranked,
        }
    }

    fn top_idea_id(&self) -> Uuid {
        self.ranked.first().map(|s| s.idea_id).unwrap_or_default()
    }
}

fn check_text(field: &str, value: &str, max: usize) -> Result<(), ServiceError> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(ServiceError::InvalidOutput(format!(
            "{field} must be 1..{max} characters"
        )));
    }
    Ok(())
}

fn check_list(field: &str, items: &[String], min: usize, max: usize) -> Result<(), ServiceError> {
    if items.len() < min || items.len() > max {
        return Err(ServiceError::InvalidOutput(format!(
            "{field} must have {min} to {max} items"
        )));
    }
    for item in items {
        check_text(field, item, MAX_PLAN_ITEM)?;
    }
    Ok(())
}

fn check_citation_count(field: &str, citations: &[Citation]) -> Result<(), ServiceError> {
    if citations.len() > MAX_ARTIFACT_CITATIONS {
        return Err(ServiceError::InvalidOutput(format!(
            "{field} has more than {MAX_ARTIFACT_CITATIONS} citations"
        )));
    }
    Ok(())
}

fn check_plan(plan: &ModelPlan) -> Result<(), ServiceError> {
    check_text("plan.title", &plan.title, MAX_PLAN_TITLE)?;
    check_list("plan.days30", &plan.days30, 3, 10)?;
    check_list("plan.days60", &plan.days60, 3, 10)?;
    check_list("plan.days90", &plan.days90, 3, 10)?;
    check_citation_count("plan", &plan.citations)
}

fn check_card(card: &ModelExperimentCard) -> Result<(), ServiceError> {
    check_text("experimentCard.title", &card.title, MAX_CARD_TITLE)?;
    check_text("experimentCard.problem", &card.problem, MAX_PROBLEM)?;
    check_text("experimentCard.hypothesis", &card.hypothesis, MAX_HYPOTHESIS)?;
    check_text("experimentCard.dataset", &card.dataset, MAX_DATASET)?;
    check_list("experimentCard.metrics", &card.metrics, 2, 10)?;
    check_list("experimentCard.goNoGo", &card.go_no_go, 2, 10)?;
    check_citation_count("experimentCard", &card.citations)
}

fn push_list(out: &mut String, items: &[String]) {
    for item in items {
        out.push_str("- ");
        out.push_str(item.trim());
        out.push('\n');
    }
}

fn push_sources(out: &mut String, citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }
    out.push_str("\n## Sources\n");
    for (idx, citation) in citations.iter().enumerate() {
        out.push_str(&format!(
            "- [C{}] {}: \"{}\"\n",
            idx + 1,
            citation.chunk_id,
            citation.quote
        ));
    }
}

pub fn render_plan_markdown(plan: &ModelPlan, citations: &[Citation]) -> String {
    let mut out = format!("# {}\n\n## 0-30 days\n", plan.title.trim());
    push_list(&mut out, &plan.days30);
    out.push_str("\n## 31-60 days\n");
    push_list(&mut out, &plan.days60);
    out.push_str("\n## 61-90 days\n");
    push_list(&mut out, &plan.days90);
    push_sources(&mut out, citations);
    out
}

pub fn render_card_markdown(card: &ModelExperimentCard, citations: &[Citation]) -> String {
    let mut out = format!("# Experiment Card: {}\n\n", card.title.trim());
    out.push_str(&format!("**Idea:** {}\n\n", card.idea_id));
    out.push_str(&format!("## Problem\n{}\n\n", card.problem.trim()));
    out.push_str(&format!("## Hypothesis\n{}\n\n", card.hypothesis.trim()));
    out.push_str(&format!("## Dataset\n{}\n\n", card.dataset.trim()));
    out.push_str("## Metrics\n");
    push_list(&mut out, &card.metrics);
    out.push_str("\n## Go / No-go criteria\n");
    push_list(&mut out, &card.go_no_go);
    push_sources(&mut out, citations);
    out
}

#[async_trait]
impl Pipeline for ArtifactPipeline {
    type Rows = Vec<NewArtifact>;
    type Output = GeneratedArtifacts;

    async fn gather_evidence(
        &self,
        engine: &Orchestrator,
        job: &Job,
    ) -> Result<Vec<EvidenceChunk>, ServiceError> {
        let ids = self.run.source_ids();
        if ids.is_empty() {
            return Err(ServiceError::SourcesMissing);
        }

        let mut chunks = engine.retriever().fetch(job.project_id, &ids).await?;
        for chunk in &mut chunks {
            chunk.similarity = self
                .run
                .sources_used
                .iter()
                .find(|s| s.chunk_id == chunk.id)
                .and_then(|s| s.similarity);
        }
        if chunks.len() < ids.len() {
            tracing::warn!(
                job_id = %job.id,
                run_id = %self.run.id,
                missing = ids.len() - chunks.len(),
                "Some run sources no longer exist"
            );
        }
        Ok(chunks)
    }

    fn render_prompt(&self, _job: &Job, evidence: &[EvidenceChunk]) -> Prompt {
        let ranked: Vec<RankedIdea<'_>> = self
            .ranked
            .iter()
            .map(|score| RankedIdea {
                score,
                idea: self.ideas.iter().find(|i| i.id == score.idea_id),
            })
            .collect();
        prompt::artifacts_prompt(&self.constraints, &ranked, self.top_idea_id(), evidence)
    }

    fn interpret(
        &self,
        job: &Job,
        answer: Value,
        grounding: &Grounding<'_>,
    ) -> Result<Interpreted<Self::Rows>, ServiceError> {
        let parsed: ModelArtifacts = serde_json::from_value(answer)
            .map_err(|e| ServiceError::InvalidOutput(format!("artifacts do not match schema: {e}")))?;

        let top = self.top_idea_id();
        if parsed.experiment_card.idea_id != top {
            return Err(ServiceError::InvalidOutput(format!(
                "experiment card is for {} instead of top idea {}",
                parsed.experiment_card.idea_id, top
            )));
        }
        check_plan(&parsed.plan)?;
        check_card(&parsed.experiment_card)?;

        let mut plan = parsed.plan;
        let mut card = parsed.experiment_card;
        let plan_citations = grounding.apply(std::mem::take(&mut plan.citations))?;
        let card_citations = grounding.apply(std::mem::take(&mut card.citations))?;

        let row = |kind, content_markdown, citations| NewArtifact {
            job_id: job.id,
            run_id: self.run.id,
            project_id: job.project_id,
            owner_id: job.owner_id,
            kind,
            content_markdown,
            citations,
        };

        let rows = vec![
            row(
                ArtifactKind::Plan306090,
                render_plan_markdown(&plan, &plan_citations.accepted),
                plan_citations.accepted,
            ),
            row(
                ArtifactKind::ExperimentCard,
                render_card_markdown(&card, &card_citations.accepted),
                card_citations.accepted,
            ),
        ];

        Ok(Interpreted {
            rows,
            dropped_citations: plan_citations.dropped + card_citations.dropped,
        })
    }

    async fn persist(
        &self,
        engine: &Orchestrator,
        job: &Job,
        rows: Self::Rows,
    ) -> Result<Self::Output, ServiceError> {
        let saved = engine.repo().insert_artifacts(&rows).await?;

        for artifact in &saved {
            engine.publish(
                ProgressEvent::new(job.id, EventKind::ArtifactCreated).with_payload(json!({
                    "artifact_id": artifact.id,
                    "artifact_kind": artifact.kind,
                    "run_id": artifact.run_id,
                })),
            );
        }

        let pick = |kind: ArtifactKind| {
            saved.iter().find(|a| a.kind == kind).cloned().ok_or_else(|| {
                ServiceError::Internal(format!("{} was not saved", kind.as_str()))
            })
        };
        Ok(GeneratedArtifacts {
            plan: pick(ArtifactKind::Plan306090)?,
            experiment_card: pick(ArtifactKind::ExperimentCard)?,
        })
    }
}
