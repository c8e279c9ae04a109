//! Caller identity from the `X-Owner-Id` header, set by the upstream auth proxy.

use crate::error::AppError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

pub const OWNER_ID_HEADER: &str = "X-Owner-Id";

/// Authenticated owner. Missing or malformed header rejects with 401.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized(format!("{} header is required", OWNER_ID_HEADER)))?;
        Uuid::parse_str(raw)
            .map(OwnerId)
            .map_err(|_| AppError::Unauthorized(format!("{} must be a UUID", OWNER_ID_HEADER)))
    }
}
