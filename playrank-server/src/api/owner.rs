//! Caller identity
//!
//! The upstream auth layer puts the authenticated user id in `x-owner-id`.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::api::error::ApiError;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Id of the calling user
#[derive(Debug, Clone, Copy)]
pub struct Owner(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {OWNER_HEADER} header")))?;

        raw.to_str()
            .ok()
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .map(Owner)
            .ok_or_else(|| ApiError::Unauthorized(format!("invalid {OWNER_HEADER} header")))
    }
}
