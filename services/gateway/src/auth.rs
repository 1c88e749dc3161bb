//! Bearer-token authentication
//!
//! Authentication is a collaborator interface: one verifier over HS256
//! JWTs whose `sub` carries the user id. REST extracts the token from
//! the Authorization header; WebSocket upgrades pass it as a `token`
//! query parameter because browsers cannot set headers there.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use types::ids::UserId;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Verify a bearer token and extract its user id.
pub fn verify_token(secret: &str, token: &str) -> Option<UserId> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::default()).ok()?;
    data.claims.sub.parse().ok()
}

/// Extractor for endpoints that require an authenticated user.
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("malformed authorization header".to_string()))?;
        let user_id = verify_token(&state.config.jwt_secret, token)
            .ok_or_else(|| ApiError::Unauthorized("invalid token".to_string()))?;
        Ok(Self { user_id })
    }
}
