//! Pulls a validated session out of the `Authorization: Bearer <token>`
//! header. Any endpoint that requires an active session takes this as a
//! handler argument instead of re-validating the header itself.

use crate::error::{unauthorized, ApiError};
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use identity_auth::ValidatedToken;

pub struct AuthenticatedUser(pub ValidatedToken);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("missing Authorization header"))?;
        let token = header.strip_prefix("Bearer ").ok_or_else(|| unauthorized("expected a Bearer token"))?;
        let validated = state.auth.validate_access_token(token).await.map_err(|_| unauthorized("invalid or expired session"))?;
        Ok(AuthenticatedUser(validated))
    }
}
