//! Embeddings call

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::ModelClient;
use crate::error::{ClientError, Result};

/// Turns text into embedding vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input, in input order
    async fn embed(&self, input: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for ModelClient {
    async fn embed(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.embeddings_model,
            "input": input,
            "encoding_format": "float",
        });

        let reply = self.post_json("/embeddings", &body).await?;
        let mut parsed: EmbeddingsResponse = reply
            .json()
            .map_err(|e| ClientError::ParseError(format!("embeddings response: {}", e)))?;

        if parsed.data.len() != input.len() {
            return Err(ClientError::ParseError(format!(
                "expected {} embeddings, got {}",
                input.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Format a vector as a pgvector text literal, e.g. `[0.1,0.2]`
pub fn to_pgvector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}
