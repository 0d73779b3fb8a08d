//! Progress event types
//!
//! Progress events are ephemeral: they are buffered in memory for late
//! subscribers and never persisted. Only the terminal job record is durable.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::job::Job;

/// Event type tag, used as the SSE `event:` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "stream.open")]
    StreamOpen,
    #[serde(rename = "run.snapshot")]
    Snapshot,
    #[serde(rename = "run.started")]
    Started,
    #[serde(rename = "run.sources_ready")]
    SourcesReady,
    #[serde(rename = "plan.progress")]
    Progress,
    #[serde(rename = "idea.scored")]
    ItemScored,
    #[serde(rename = "artifact.created")]
    ArtifactCreated,
    #[serde(rename = "run.completed")]
    Completed,
    #[serde(rename = "run.failed")]
    Failed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::StreamOpen => "stream.open",
            EventKind::Snapshot => "run.snapshot",
            EventKind::Started => "run.started",
            EventKind::SourcesReady => "run.sources_ready",
            EventKind::Progress => "plan.progress",
            EventKind::ItemScored => "idea.scored",
            EventKind::ArtifactCreated => "artifact.created",
            EventKind::Completed => "run.completed",
            EventKind::Failed => "run.failed",
        }
    }

    /// Terminal events end a job's stream
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Completed | EventKind::Failed)
    }
}

/// Pipeline stage of a job
///
/// Only `Created` and the terminal stages correspond to persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Created,
    Retrieving,
    Generating,
    Persisting,
    Completed,
    Failed,
}

impl RunStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStage::Created => "created",
            RunStage::Retrieving => "retrieval",
            RunStage::Generating => "generating",
            RunStage::Persisting => "persisting",
            RunStage::Completed => "completed",
            RunStage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStage::Completed | RunStage::Failed)
    }

    /// Stages only move forward; any non-terminal stage may fail
    pub fn can_advance_to(self, next: RunStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            RunStage::Failed => true,
            RunStage::Created => false,
            _ => next > self,
        }
    }
}

/// A typed progress notification for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub kind: EventKind,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Event-specific fields, always a JSON object
    pub payload: Value,
}

impl ProgressEvent {
    pub fn new(job_id: Uuid, kind: EventKind) -> Self {
        Self {
            job_id,
            kind,
            stage: None,
            message: None,
            timestamp: chrono::Utc::now(),
            payload: Value::Object(Map::new()),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Merge the fields of `payload` (an object) into this event's payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        if let (Value::Object(target), Value::Object(extra)) = (&mut self.payload, payload) {
            target.extend(extra);
        }
        self
    }

    /// Synthetic event describing the persisted state of a job
    pub fn snapshot(job: &Job) -> Self {
        Self::new(job.id, EventKind::Snapshot).with_payload(serde_json::json!({
            "status": job.status,
            "kind": job.kind,
            "error_type": job.error_type,
            "error_message": job.error_message,
            "sources_count": job.sources_used.len(),
        }))
    }

    /// The JSON body sent on the wire: envelope fields plus the flattened payload
    pub fn to_wire(&self) -> Value {
        let mut body = Map::new();
        body.insert("job_id".to_string(), Value::String(self.job_id.to_string()));
        if let Some(stage) = &self.stage {
            body.insert("stage".to_string(), Value::String(stage.clone()));
        }
        if let Some(message) = &self.message {
            body.insert("message".to_string(), Value::String(message.clone()));
        }
        body.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339()),
        );
        if let Value::Object(payload) = &self.payload {
            for (key, value) in payload {
                body.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        Value::Object(body)
    }
}
