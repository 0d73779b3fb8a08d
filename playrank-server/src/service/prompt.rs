//! Prompt rendering
//!
//! Prompts are pure functions of the job input and evidence, so the same
//! input always produces byte-identical prompts.

use playrank_core::domain::evidence::EvidenceChunk;
use playrank_core::domain::score::IdeaScore;
use playrank_core::dto::run::{IdeaSnapshot, RunInputSnapshot};
use uuid::Uuid;

/// Fixed query used to gather evidence for scoring runs
pub const SCORING_QUERY: &str = "Best practices for prioritizing R&D ideas by impact, effort, risk, and data readiness. Include guidance on metrics and go/no-go.";

const SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const SCORING_SYSTEM: &str = "\
You are an R&D prioritization assistant.
Return ONLY valid JSON that matches the required schema.
Use the provided SOURCES to justify best-practice tips and include citations.
Citations must reference chunkId values exactly as provided, and every quote must be copied verbatim from that Source's text.
Never cite a chunkId that is not listed in SOURCES. Do not invent sources.
Scores are integers from 1 to 10.
- Higher impact is better.
- Higher dataReadiness is better.
- Higher effort is worse.
- Higher risk is worse.";

const ARTIFACTS_SYSTEM: &str = "\
You are an R&D planning assistant.
Return ONLY valid JSON matching the required schema.
Use SOURCES for best-practice recommendations and include citations with exact chunkId values.
Quotes must be copied verbatim from SOURCES. Never cite a chunkId that is not listed in SOURCES. Do not invent sources.
Citations must be objects: { \"chunkId\": \"...\", \"quote\": \"...\" }, never plain strings.";

/// Full text of every evidence chunk, labelled with its id
pub fn render_sources(chunks: &[EvidenceChunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            let title = c.title.as_deref().unwrap_or("(none)");
            format!("Source chunkId={}\nTitle: {}\n{}", c.id, title, c.text)
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

fn render_constraints(constraints: &serde_json::Value) -> String {
    if constraints.is_null() {
        return "{}".to_string();
    }
    serde_json::to_string_pretty(constraints).unwrap_or_else(|_| "{}".to_string())
}

pub fn scoring_prompt(input: &RunInputSnapshot, chunks: &[EvidenceChunk]) -> Prompt {
    let ideas = input
        .ideas
        .iter()
        .map(|i| format!("ideaId={}\ntitle={}\ntext={}", i.id, i.title, i.text))
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let user = format!(
        "PROJECT CONSTRAINTS (use for rough estimates):\n{constraints}\n\n\
         SOURCES:\n{sources}\n\n\
         IDEAS:\n{ideas}\n\n\
         TASK:\n\
         For each idea, output:\n\
         - ideaId (exactly as listed above, each idea once)\n\
         - impact, effort, risk, dataReadiness (1..10)\n\
         - rationale (brief)\n\
         - citations: up to 8 items {{ \"chunkId\", \"quote\" }} where quote is copied verbatim from that Source\n\
         - costEstimateUsd (optional, rough)\n\
         - resourceEstimate: {{ feDays?, beDays?, dsDays? }} (rough)\n\
         Return JSON with shape: {{ \"scores\": [ ... ] }}.",
        constraints = render_constraints(&input.project.constraints),
        sources = render_sources(chunks),
        ideas = ideas,
    );

    Prompt {
        system: SCORING_SYSTEM.to_string(),
        user,
    }
}

/// One entry of the ranked idea list given to the artifact prompt
#[derive(Debug, Clone)]
pub struct RankedIdea<'a> {
    pub score: &'a IdeaScore,
    pub idea: Option<&'a IdeaSnapshot>,
}

pub fn artifacts_prompt(
    constraints: &serde_json::Value,
    ranked: &[RankedIdea<'_>],
    top_idea_id: Uuid,
    chunks: &[EvidenceChunk],
) -> Prompt {
    let ideas = ranked
        .iter()
        .enumerate()
        .map(|(idx, r)| {
            let s = r.score;
            let title = r.idea.map(|i| i.title.as_str()).unwrap_or("(no title)");
            let text = r.idea.map(|i| i.text.as_str()).unwrap_or("");
            let resources = serde_json::to_string(&s.resource_estimate).unwrap_or_default();
            let cost = s
                .cost_estimate_usd
                .map(|c| c.to_string())
                .unwrap_or_default();
            format!(
                "RANK={}\nideaId={}\ntitle={}\ntext={}\nimpact={}\neffort={}\nrisk={}\n\
                 dataReadiness={}\noverall={:.1}\nrationale={}\nresourceEstimate={}\ncostEstimateUsd={}",
                idx + 1,
                s.idea_id,
                title,
                text,
                s.scores.impact,
                s.scores.effort,
                s.scores.risk,
                s.scores.data_readiness,
                s.overall,
                s.rationale,
                resources,
                cost
            )
        })
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    let user = format!(
        "PROJECT CONSTRAINTS:\n{constraints}\n\n\
         TOP IDEAS (ranked):\n{ideas}\n\n\
         SOURCES:\n{sources}\n\n\
         TASK:\n\
         1) Create a practical 30-60-90 day plan for executing the top ideas. Keep actions concrete.\n\
         \x20  - Each list item must be an actionable step (3 to 10 items per period).\n\
         \x20  - Respect constraints (budget/team) when proposing scope.\n\
         2) Create ONE Experiment Card for the #1 ranked idea (ideaId={top}).\n\
         \x20  - The experimentCard.ideaId MUST equal {top}.\n\
         \x20  - Include: problem, hypothesis, dataset, metrics (2 to 10), goNoGo (2 to 10).\n\
         3) Add citations for best-practice tips using chunkId values from SOURCES.\n\
         \x20  - Quotes must be copied verbatim from SOURCES.\n\
         \x20  - citations must be objects: {{ \"chunkId\": \"...\", \"quote\": \"...\" }}.\n\n\
         Return JSON:\n\
         {{\n\
         \x20 \"plan\": {{ \"title\", \"days30\": [...], \"days60\": [...], \"days90\": [...], \"citations\": [...] }},\n\
         \x20 \"experimentCard\": {{ \"ideaId\", \"title\", \"problem\", \"hypothesis\", \"dataset\", \"metrics\": [...], \"goNoGo\": [...], \"citations\": [...] }}\n\
         }}",
        constraints = render_constraints(constraints),
        ideas = ideas,
        sources = render_sources(chunks),
        top = top_idea_id,
    );

    Prompt {
        system: ARTIFACTS_SYSTEM.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playrank_core::domain::project::{Idea, Project};
    use playrank_core::domain::score::{ResourceEstimate, SubScores, Weights};

    fn fixture() -> (RunInputSnapshot, Vec<EvidenceChunk>) {
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Search".to_string(),
            constraints: serde_json::json!({ "teamSize": 2 }),
        };
        let ideas = vec![Idea {
            id: Uuid::new_v4(),
            project_id: project.id,
            title: "Typo tolerance".to_string(),
            raw_text: "Fuzzy matching for queries".to_string(),
        }];
        let chunks = vec![EvidenceChunk {
            id: Uuid::new_v4(),
            title: Some("Prioritization".to_string()),
            text: "Rank by expected value over cost.".to_string(),
            similarity: Some(0.91),
        }];
        (
            RunInputSnapshot::new(&project, &ideas, Weights::default(), 5),
            chunks,
        )
    }

    #[test]
    fn test_scoring_prompt_carries_input_and_evidence() {
        let (input, chunks) = fixture();
        let prompt = scoring_prompt(&input, &chunks);

        assert!(prompt.user.contains(&format!("ideaId={}", input.ideas[0].id)));
        assert!(prompt.user.contains(&format!("Source chunkId={}", chunks[0].id)));
        assert!(prompt.user.contains("Rank by expected value over cost."));
        assert!(prompt.user.contains("\"teamSize\": 2"));
        assert!(prompt.system.contains("verbatim"));
        assert!(prompt.system.contains("not listed in SOURCES"));
    }

    #[test]
    fn test_scoring_prompt_is_deterministic() {
        let (input, chunks) = fixture();
        assert_eq!(scoring_prompt(&input, &chunks), scoring_prompt(&input, &chunks));
    }

    #[test]
    fn test_artifacts_prompt_pins_top_idea() {
        let (input, chunks) = fixture();
        let score = IdeaScore {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            project_id: input.project.id,
            owner_id: Uuid::new_v4(),
            idea_id: input.ideas[0].id,
            scores: SubScores {
                impact: 8,
                effort: 3,
                risk: 2,
                data_readiness: 6,
            },
            overall: 71.25,
            rationale: "Cheap win".to_string(),
            citations: Vec::new(),
            cost_estimate_usd: Some(12000),
            resource_estimate: ResourceEstimate::default(),
            created_at: chrono::Utc::now(),
        };
        let ranked = [RankedIdea {
            score: &score,
            idea: input.ideas.first(),
        }];

        let prompt = artifacts_prompt(&input.project.constraints, &ranked, score.idea_id, &chunks);

        assert!(prompt.user.contains("RANK=1"));
        assert!(prompt.user.contains("title=Typo tolerance"));
        assert!(prompt.user.contains(&format!("experimentCard.ideaId MUST equal {}", score.idea_id)));
        assert!(prompt.user.contains("overall=71.2") || prompt.user.contains("overall=71.3"));
        assert!(prompt.user.contains("costEstimateUsd=12000"));
        assert!(prompt.system.contains("verbatim"));
    }

    #[test]
    fn test_untitled_chunk() {
        let chunk = EvidenceChunk {
            id: Uuid::nil(),
            title: None,
            text: "body".to_string(),
            similarity: None,
        };
        assert_eq!(
            render_sources(&[chunk]),
            format!("Source chunkId={}\nTitle: (none)\nbody", Uuid::nil())
        );
    }
}
