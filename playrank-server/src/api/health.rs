//! Health Check API Handler

use axum::{Json, response::IntoResponse};

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}
