//! Bearer-token authentication extractor
//!
//! `Authed` pulls the access token from the `Authorization` header,
//! validates it against the signer and exposes the claims. Handlers
//! gate on scopes with `require_scope`, which answers 403 without
//! disclosing anything else.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth;
use crate::auth::token::AccessClaims;

use super::super::error::ApiError;
use super::super::state::ApiState;

/// Validated caller identity: user id and effective scopes as carried
/// in the access token.
#[derive(Debug, Clone)]
pub struct Authed(pub AccessClaims);

impl Authed {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.0.scopes
    }

    pub fn require_scope(&self, required: &str) -> Result<(), ApiError> {
        auth::require_scope(required, &self.0.scopes).map_err(ApiError::from)
    }
}

#[axum::async_trait]
impl FromRequestParts<ApiState> for Authed {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Authorization header is empty".to_string()))?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Authorization header is invalid".to_string())
        })?;

        let claims = state
            .auth
            .verify_access(token)
            .map_err(|_| ApiError::Unauthorized("Invalid access token".to_string()))?;

        Ok(Authed(claims))
    }
}
