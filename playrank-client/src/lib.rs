//! Playrank model client
//!
//! HTTP client for the external model provider (an OpenAI-compatible API).
//! All calls go through the retry transport in [`transport`]; failed calls are
//! classified into stable error types the server stores on failed jobs.
//!
//! # Example
//!
//! ```no_run
//! use playrank_client::{ChatModel, ModelClient};
//!
//! # async fn example() -> playrank_client::Result<()> {
//! let client = ModelClient::new("https://api.openai.com/v1", Some("sk-...".to_string()));
//! let reply = client
//!     .complete("Return JSON only.", "{\"ping\": true}", "gpt-4o-mini")
//!     .await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

mod chat;
mod embeddings;
pub mod error;
pub mod transport;

#[cfg(test)]
mod testing;

pub use chat::{ChatCompletion, ChatModel};
pub use embeddings::{Embedder, to_pgvector_literal};
pub use error::{ClientError, Result};
pub use transport::{Reply, RetryPolicy};

use reqwest::Client;
use serde::Deserialize;
use tracing::error;

/// Longest provider error body kept in logs and errors
const MAX_ERROR_BODY_CHARS: usize = 2000;

/// Default embeddings model
pub const DEFAULT_EMBEDDINGS_MODEL: &str = "text-embedding-3-small";

/// HTTP client for the model provider
#[derive(Debug, Clone)]
pub struct ModelClient {
    /// Base URL of the provider API (e.g., "https://api.openai.com/v1")
    base_url: String,
    api_key: Option<String>,
    /// HTTP client instance
    client: Client,
    policy: RetryPolicy,
    embeddings_model: String,
}

impl ModelClient {
    /// Create a new model client
    ///
    /// A missing API key is not an error here; every call fails with
    /// [`ClientError::MissingApiKey`] instead.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self::with_client(base_url, api_key, Client::new())
    }

    /// Create a new model client with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, api_key: Option<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
            policy: RetryPolicy::default(),
            embeddings_model: DEFAULT_EMBEDDINGS_MODEL.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_embeddings_model(mut self, model: impl Into<String>) -> Self {
        self.embeddings_model = model.into();
        self
    }

    /// Get the base URL of the provider
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(ClientError::MissingApiKey)
    }

    // =============================================================================
    // Request Helpers
    // =============================================================================

    /// POST a JSON body with retries and return the successful reply
    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<Reply> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);

        let reply = transport::send_with_retry(
            || self.client.post(&url).bearer_auth(api_key).json(body),
            &self.policy,
        )
        .await?;

        if reply.status.is_success() {
            return Ok(reply);
        }

        let status = reply.status.as_u16();
        let body_text = reply.text();
        let message: String = body_text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        error!(status, body = %message, path, "Model provider request failed");

        Err(ClientError::ApiError {
            status,
            code: provider_error_code(&body_text),
            message,
        })
    }
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Extract `error.code` (or `error.type`) from a provider error body
fn provider_error_code(body: &str) -> Option<String> {
    let parsed: ProviderErrorBody = serde_json::from_str(body).ok()?;
    parsed.error.code.or(parsed.error.kind)
}
