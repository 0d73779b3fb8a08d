//! API Error Handling
//!
//! Maps service errors to HTTP responses. The body is always
//! `{"errorType": ..., "error": ...}` with a message safe for end users.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use playrank_client::ClientError;

use crate::service::ServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::ProjectNotFound(_)
        | ServiceError::RunNotFound(_)
        | ServiceError::JobNotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Validation(_)
        | ServiceError::IdeasEmpty
        | ServiceError::EvidenceEmpty
        | ServiceError::SourcesMissing
        | ServiceError::RunHasNoScores => StatusCode::BAD_REQUEST,
        ServiceError::RunNotCompleted => StatusCode::CONFLICT,
        ServiceError::InvalidOutput(_)
        | ServiceError::UnknownItemReference(_)
        | ServiceError::DuplicateItemReference(_)
        | ServiceError::InvalidCitation(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Upstream(ClientError::MissingApiKey) => StatusCode::INTERNAL_SERVER_ERROR,
        ServiceError::Upstream(e) if e.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Database(_) | ServiceError::RunStuck | ServiceError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Service(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error_type = err.error_type(), error = %err, "Request failed");
                } else {
                    tracing::debug!(error_type = err.error_type(), error = %err, "Request rejected");
                }
                (status, err.error_type(), err.public_message())
            }
        };

        (
            status,
            Json(serde_json::json!({ "errorType": error_type, "error": message })),
        )
            .into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
