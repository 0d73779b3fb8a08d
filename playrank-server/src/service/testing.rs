//! Test doubles for the service layer

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use playrank_client::{ChatCompletion, ChatModel, ClientError};
use playrank_core::domain::evidence::EvidenceChunk;
use playrank_core::domain::job::{Job, JobKind, NewJob};
use playrank_core::domain::project::{Idea, Project};
use playrank_core::dto::run::CreateRun;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::broker::EventBroker;
use crate::repository::Repository;
use crate::repository::memory::InMemoryRepository;
use crate::retrieval::{RetrievalError, Retriever};
use crate::service::orchestrator::{Orchestrator, Settings};
use crate::service::run;
use crate::service::scoring::ScoringPipeline;

/// Retriever over a fixed list of chunks
pub struct FakeRetriever {
    chunks: Vec<EvidenceChunk>,
    searches: AtomicUsize,
}

impl FakeRetriever {
    pub fn new(chunks: Vec<EvidenceChunk>) -> Self {
        Self {
            chunks,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FakeRetriever {
    async fn search(
        &self,
        _project_id: Uuid,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.iter().take(top_k).cloned().collect())
    }

    async fn fetch(&self, _project_id: Uuid, ids: &[Uuid]) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.chunks.iter().find(|c| c.id == *id).cloned())
            .collect())
    }
}

/// Chat model that replays queued replies
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, ClientError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    hang: AtomicBool,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, answer: Value) {
        self.replies.lock().push_back(Ok(answer.to_string()));
    }

    pub fn push_raw(&self, content: &str) {
        self.replies.lock().push_back(Ok(content.to_string()));
    }

    pub fn push_err(&self, err: ClientError) {
        self.replies.lock().push_back(Err(err));
    }

    /// Never answer
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, _system: &str, user: &str, model: &str) -> playrank_client::Result<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(user.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::ParseError("no scripted reply".to_string())));
        reply.map(|content| ChatCompletion {
            model: model.to_string(),
            content,
        })
    }
}

/// A seeded project with ideas and evidence, wired to an orchestrator
pub struct Fixture {
    pub repo: Arc<InMemoryRepository>,
    pub broker: Arc<EventBroker>,
    pub retriever: Arc<FakeRetriever>,
    pub chat: Arc<ScriptedChat>,
    pub engine: Arc<Orchestrator>,
    pub owner_id: Uuid,
    pub project: Project,
    pub ideas: Vec<Idea>,
    pub chunks: Vec<EvidenceChunk>,
}

impl Fixture {
    pub fn new(ideas: usize, chunks: usize) -> Self {
        Self::with_settings(ideas, chunks, Settings::default())
    }

    pub fn with_settings(ideas: usize, chunks: usize, settings: Settings) -> Self {
        let chat = Arc::new(ScriptedChat::new());
        Self::build(ideas, chunks, chat.clone(), chat, settings)
    }

    /// Use `chat` for model calls; `self.chat` stays unused
    pub fn with_chat(ideas: usize, chunks: usize, chat: Arc<dyn ChatModel>, settings: Settings) -> Self {
        Self::build(ideas, chunks, chat, Arc::new(ScriptedChat::new()), settings)
    }

    fn build(
        idea_count: usize,
        chunk_count: usize,
        model: Arc<dyn ChatModel>,
        chat: Arc<ScriptedChat>,
        settings: Settings,
    ) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let owner_id = Uuid::new_v4();
        let project = repo.seed_project(owner_id, "Search");
        let ideas = (0..idea_count)
            .map(|i| repo.seed_idea(project.id, &format!("Idea {}", i + 1)))
            .collect();
        let chunks: Vec<EvidenceChunk> = (0..chunk_count)
            .map(|i| EvidenceChunk {
                id: Uuid::new_v4(),
                title: Some(format!("Playbook {}", i + 1)),
                text: format!("Guidance number {} about prioritization.", i + 1),
                similarity: Some(0.9 - i as f64 * 0.05),
            })
            .collect();

        let broker = Arc::new(EventBroker::new(64));
        let retriever = Arc::new(FakeRetriever::new(chunks.clone()));
        let engine = Arc::new(Orchestrator::new(
            repo.clone(),
            retriever.clone(),
            model,
            broker.clone(),
            settings,
        ));

        Self {
            repo,
            broker,
            retriever,
            chat,
            engine,
            owner_id,
            project,
            ideas,
            chunks,
        }
    }

    /// A fresh scoring job over all seeded ideas
    pub async fn scoring_job(&self) -> (Job, ScoringPipeline) {
        run::prepare(&self.engine, self.owner_id, self.project.id, CreateRun::default())
            .await
            .unwrap()
    }

    /// A running job row that no pipeline drives
    pub fn bare_job(&self) -> Job {
        let new = NewJob {
            kind: JobKind::Run,
            project_id: self.project.id,
            owner_id: self.owner_id,
            parent_job_id: None,
            model: None,
            input_snapshot: json!({}),
        };
        futures::executor::block_on(self.repo.create_job(new)).unwrap()
    }
}

/// A well-formed scoring answer for `ideas`; `citations(i)` supplies each entry's citations
pub fn scores_answer(ideas: &[Idea], citations: impl Fn(usize) -> Vec<Value>) -> Value {
    let scores: Vec<Value> = ideas
        .iter()
        .enumerate()
        .map(|(i, idea)| {
            json!({
                "ideaId": idea.id,
                "impact": 8 - (i as i32 % 5),
                "effort": 3,
                "risk": 2 + (i as i32 % 3),
                "dataReadiness": 6,
                "rationale": format!("Reasoning for {}", idea.title),
                "citations": citations(i),
                "resourceEstimate": { "feDays": 3, "beDays": 5 }
            })
        })
        .collect();
    json!({ "scores": scores })
}

/// A well-formed artifact answer whose card targets `top_idea`
pub fn artifacts_answer(top_idea: Uuid, citations: Vec<Value>) -> Value {
    json!({
        "plan": {
            "title": "Quarter plan",
            "days30": ["Collect baseline", "Label data", "Pick metrics"],
            "days60": ["Build prototype", "Run pilot", "Review results"],
            "days90": ["Roll out", "Monitor", "Decide next bet"],
            "citations": citations
        },
        "experimentCard": {
            "ideaId": top_idea,
            "title": "Pilot the top idea",
            "problem": "Users cannot find what they need.",
            "hypothesis": "The top idea improves task success.",
            "dataset": "Last month of sessions.",
            "metrics": ["Task success", "Time to result"],
            "goNoGo": ["Success +5%", "No latency regression"],
            "citations": []
        }
    })
}
