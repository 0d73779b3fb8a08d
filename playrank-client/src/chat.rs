//! Chat-completion call

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::ModelClient;
use crate::error::{ClientError, Result};

/// Sampling temperature for every structured-output call
const TEMPERATURE: f64 = 0.2;

/// Reply of a chat-completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletion {
    /// Model that produced the reply
    pub model: String,
    /// Raw message content, expected to be a JSON object
    pub content: String,
}

/// A model that answers a system + user prompt with JSON text
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str, model: &str) -> Result<ChatCompletion>;
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for ModelClient {
    async fn complete(&self, system: &str, user: &str, model: &str) -> Result<ChatCompletion> {
        let body = json!({
            "model": model,
            "temperature": TEMPERATURE,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let reply = self.post_json("/chat/completions", &body).await?;
        let parsed: ChatResponse = reply
            .json()
            .map_err(|e| ClientError::ParseError(format!("chat response: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ClientError::ParseError("empty chat completion".to_string()))?;

        debug!(model, chars = content.len(), "Chat completion received");

        Ok(ChatCompletion {
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            content,
        })
    }
}
