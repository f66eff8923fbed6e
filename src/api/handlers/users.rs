use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::database_error;
use crate::api::auth::AuthUser;
use crate::api::response::{created, ApiError, AppJson};
use crate::storage::models::UserRecord;
use crate::storage::{normalize_email, DatabaseError};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Public projection of a user; the password hash never leaves the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
    pub expires_in: i64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let username = req.username.trim();
    let email = normalize_email(&req.email);

    if username.is_empty() || email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request(
            "username, email and password are required",
        ));
    }
    if !email.contains('@') {
        return Err(ApiError::bad_request("email must be a valid email address"));
    }

    let hasher = state.passwords.clone();
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task failed: {e}")))??;
    let user = UserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        username: username.to_string(),
        email,
        password_hash,
        created_at: Utc::now(),
    };

    state.db.insert_user(&user).map_err(|e| match e {
        DatabaseError::Conflict(_) => ApiError::bad_request("Username or email already exists"),
        other => database_error(other),
    })?;

    tracing::info!(user_id = %user.id, "Registered user");

    Ok(created(RegisterResponse {
        message: "User registered successfully".to_string(),
        user: user_to_response(&user),
    }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let user = state
        .db
        .get_user_by_email(&req.email)
        .map_err(database_error)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let hasher = state.passwords.clone();
    let stored = user.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&req.password, &stored))
        .await
        .map_err(|e| ApiError::internal(format!("Password check task failed: {e}")))?;
    if !matches {
        tracing::debug!(user_id = %user.id, "Login rejected: bad password");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let token = state.tokens.issue(&user.id, Utc::now())?;
    tracing::debug!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        token,
        user: user_to_response(&user),
        expires_in: state.tokens.ttl_secs(),
    }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .get_user(&caller.user_id)
        .map_err(database_error)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user_to_response(&user)))
}

// ============================================================================
// Helpers
// ============================================================================

fn user_to_response(user: &UserRecord) -> UserResponse {
    UserResponse {
        id: user.id.clone(),
        username: user.username.clone(),
        email: user.email.clone(),
        created_at: user.created_at.to_rfc3339(),
    }
}
