//! Error types for the model client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when calling the model provider
#[derive(Debug, Error)]
pub enum ClientError {
    /// No API key configured
    #[error("model provider API key is not configured")]
    MissingApiKey,

    /// Every attempt hit the per-attempt deadline
    #[error("model request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Every attempt failed at the network level
    #[error("model provider unreachable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Provider answered with a non-success status
    #[error("model provider error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        message: String,
        /// Provider-specific error code, if the body carried one
        code: Option<String>,
    },

    /// Provider answered 2xx but the body could not be used
    #[error("malformed model provider response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
            code: None,
        }
    }

    /// Stable classification stored on failed jobs
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingApiKey => "config_error",
            Self::Timeout { .. } => "upstream_timeout",
            Self::Unavailable { .. } => "upstream_unavailable",
            Self::ApiError { code: Some(code), .. } if code == "insufficient_quota" => {
                "upstream_quota_exceeded"
            }
            Self::ApiError { status: 429, .. } => "upstream_rate_limited",
            Self::ApiError { status, .. } if *status >= 500 => "upstream_unavailable",
            Self::ApiError { .. } | Self::ParseError(_) => "upstream_error",
        }
    }

    /// Message safe to show to end users
    pub fn public_message(&self) -> &'static str {
        match self.error_type() {
            "config_error" => "The model provider is not configured.",
            "upstream_timeout" => "The model provider timed out. Please retry later.",
            "upstream_unavailable" => {
                "The model provider is temporarily unavailable. Please retry later."
            }
            "upstream_rate_limited" => "The model provider is rate limited. Please retry later.",
            "upstream_quota_exceeded" => "The model provider quota is exhausted.",
            _ => "The model provider request failed.",
        }
    }

    /// Whether the provider may answer if asked again later
    ///
    /// True for exhausted timeouts and network failures and for final 429 or
    /// 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable { .. } => true,
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
            Self::MissingApiKey | Self::ParseError(_) => false,
        }
    }
}
