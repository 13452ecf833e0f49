//! Bearer-token request guards.
//!
//! Tokens are opaque random strings; only their SHA-256 digest is stored,
//! so resolving a request means digesting the presented token and looking
//! the digest up with the current time.

use axum::http::{header, HeaderMap};
use chrono::Utc;

use storefront_core::auth::token_digest;
use storefront_core::User;
use storefront_db::repositories::{SqlUserRepository, TokenRepository};
use storefront_db::DbPool;

use crate::error::{forbidden, repository_error, unauthorized, ApiError};

/// An authenticated request: the resolved user plus the digest of the token
/// that authenticated it. Change-password revokes every session except the
/// one named by this digest.
pub struct AuthSession {
    pub user: User,
    pub token_digest: String,
}

pub fn bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| unauthorized("authentication required"))?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized("authentication required"))?;

    Ok(token.to_string())
}

pub async fn authenticate(headers: &HeaderMap, pool: &DbPool) -> Result<AuthSession, ApiError> {
    let token = bearer_token(headers)?;
    let digest = token_digest(&token);

    let users = SqlUserRepository::new(pool.clone());
    let user = users
        .find_user_by_token(&digest, Utc::now())
        .await
        .map_err(repository_error)?
        .ok_or_else(|| unauthorized("invalid or expired token"))?;

    Ok(AuthSession { user, token_digest: digest })
}

pub fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(forbidden("admin access required"))
    }
}
