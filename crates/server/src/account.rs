//! Account routes.
//!
//! Endpoints:
//! - `POST /auth/register`        — create an account and issue a bearer token
//! - `POST /auth/login`           — verify credentials and issue a bearer token
//! - `GET  /auth/profile`         — the authenticated user
//! - `PUT  /auth/profile`         — typed profile patch (name, email, phone_number)
//! - `POST /auth/change-password` — rotate the password, dropping other sessions

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use storefront_core::auth::{generate_token, hash_password, token_digest, verify_password};
use storefront_core::config::AuthConfig;
use storefront_core::domain::user::{normalize_email, ProfilePatch, Role, User, UserId};
use storefront_db::repositories::{
    RepositoryError, SqlUserRepository, TokenRepository, UserRepository,
};
use storefront_db::DbPool;

use crate::auth::authenticate;
use crate::error::{
    bad_request, domain_error, invalid_fields, repository_error, unauthorized, ApiError,
    FieldError,
};

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone)]
pub struct AccountState {
    db_pool: DbPool,
    token_ttl_hours: u64,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public view of a user; the password hash never serializes.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: &'static str,
    pub phone_number: Option<String>,
    pub created_at: String,
    pub last_login: Option<String>,
}

impl UserResponse {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id.0.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.as_str(),
            phone_number: user.phone_number.clone(),
            created_at: user.created_at.to_rfc3339(),
            last_login: user.last_login.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(db_pool: DbPool, auth: &AuthConfig) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route("/auth/change-password", post(change_password))
        .with_state(AccountState { db_pool, token_ttl_hours: auth.token_ttl_hours })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn register(
    State(state): State<AccountState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut details = Vec::new();
    let name = body.name.trim();
    if name.is_empty() {
        details.push(FieldError::new("name", "name is required"));
    }
    let email = match normalize_email(&body.email) {
        Some(email) => email,
        None => {
            details.push(FieldError::new("email", "not a valid email address"));
            String::new()
        }
    };
    if body.password.len() < MIN_PASSWORD_LENGTH {
        details.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }
    if !details.is_empty() {
        return Err(invalid_fields("validation failed", details));
    }

    let repo = SqlUserRepository::new(state.db_pool.clone());
    if repo.find_by_email(&email).await.map_err(repository_error)?.is_some() {
        return Err(bad_request("email already registered"));
    }

    let phone_number = body
        .phone_number
        .as_deref()
        .map(str::trim)
        .filter(|phone| !phone.is_empty())
        .map(str::to_string);
    let user = User {
        id: UserId::generate(),
        name: name.to_string(),
        email,
        password_hash: hash_password(&body.password),
        role: Role::Customer,
        phone_number,
        created_at: Utc::now(),
        last_login: None,
    };
    // The pre-check races with concurrent registrations; the unique index is
    // what actually holds the line.
    if let Err(error) = repo.insert(&user).await {
        return Err(match error {
            RepositoryError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                bad_request("email already registered")
            }
            other => repository_error(other),
        });
    }

    let token = issue_token(&repo, &user.id, state.token_ttl_hours).await?;

    info!(event_name = "account.registered", user_id = %user.id.0, "account created");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse { token, user: UserResponse::from_user(&user) }),
    ))
}

async fn login(
    State(state): State<AccountState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // One deliberately unspecific message for every failure mode, so the
    // endpoint does not confirm which addresses have accounts.
    let email =
        normalize_email(&body.email).ok_or_else(|| unauthorized("invalid credentials"))?;

    let repo = SqlUserRepository::new(state.db_pool.clone());
    let Some(mut user) = repo.find_by_email(&email).await.map_err(repository_error)? else {
        return Err(unauthorized("invalid credentials"));
    };
    if !verify_password(&body.password, &user.password_hash) {
        return Err(unauthorized("invalid credentials"));
    }

    let now = Utc::now();
    repo.record_login(&user.id, now).await.map_err(repository_error)?;
    user.last_login = Some(now);

    let token = issue_token(&repo, &user.id, state.token_ttl_hours).await?;

    info!(event_name = "account.login", user_id = %user.id.0, "login succeeded");

    Ok(Json(AuthResponse { token, user: UserResponse::from_user(&user) }))
}

async fn get_profile(
    headers: HeaderMap,
    State(state): State<AccountState>,
) -> Result<Json<UserResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    Ok(Json(UserResponse::from_user(&session.user)))
}

async fn update_profile(
    headers: HeaderMap,
    State(state): State<AccountState>,
    Json(patch): Json<ProfilePatch>,
) -> Result<Json<UserResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;
    if patch.is_empty() {
        return Err(bad_request("no profile fields to update"));
    }

    let mut user = session.user;
    patch.apply(&mut user).map_err(domain_error)?;

    let repo = SqlUserRepository::new(state.db_pool.clone());
    if let Some(holder) = repo.find_by_email(&user.email).await.map_err(repository_error)? {
        if holder.id != user.id {
            return Err(bad_request("email already registered"));
        }
    }
    match repo.update_profile(&user).await {
        Ok(()) => {}
        Err(RepositoryError::Database(sqlx::Error::Database(db)))
            if db.is_unique_violation() =>
        {
            return Err(bad_request("email already registered"));
        }
        Err(other) => return Err(repository_error(other)),
    }

    Ok(Json(UserResponse::from_user(&user)))
}

async fn change_password(
    headers: HeaderMap,
    State(state): State<AccountState>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let session = authenticate(&headers, &state.db_pool).await?;

    if !verify_password(&body.current_password, &session.user.password_hash) {
        return Err(unauthorized("current password is incorrect"));
    }
    if body.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(invalid_fields(
            "validation failed",
            vec![FieldError::new(
                "new_password",
                format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
            )],
        ));
    }

    let repo = SqlUserRepository::new(state.db_pool.clone());
    repo.update_password(&session.user.id, &hash_password(&body.new_password))
        .await
        .map_err(repository_error)?;
    // Every other session is dropped; the one that made the change lives on.
    let revoked = repo
        .revoke_other_tokens(&session.user.id, &session.token_digest)
        .await
        .map_err(repository_error)?;

    info!(
        event_name = "account.password_changed",
        user_id = %session.user.id.0,
        revoked_sessions = revoked,
        "password changed"
    );

    Ok(Json(MessageResponse { message: "password changed".to_string() }))
}

async fn issue_token(
    repo: &SqlUserRepository,
    user_id: &UserId,
    ttl_hours: u64,
) -> Result<String, ApiError> {
    let token = generate_token();
    let now = Utc::now();
    let expires_at = now + Duration::hours(ttl_hours as i64);
    repo.insert_token(&token_digest(&token), user_id, now, expires_at)
        .await
        .map_err(repository_error)?;
    Ok(token)
}
