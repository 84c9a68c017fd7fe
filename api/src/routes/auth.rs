use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskdeck_core::auth;
use taskdeck_core::error::codes;

use crate::auth::{AuthenticatedUser, TOKEN_TTL_SECS};
use crate::error::AppError;
use crate::state::AppState;

pub fn register_router() -> Router<AppState> {
    Router::new().route("/auth/register", post(register))
}

pub fn login_router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}

pub fn me_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(me))
}

// ──────────────────────────────────────────────
// POST /auth/register
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = UserResponse),
        (status = 409, description = "Email already registered", body = taskdeck_core::error::ApiError),
        (status = 422, description = "Validation error", body = taskdeck_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();
    validate_email(&email)?;
    validate_password(&req.password)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation {
            message: "name must not be empty".to_string(),
            field: Some("name".to_string()),
            received: None,
        });
    }

    let password_hash = auth::hash_password(&req.password).map_err(AppError::Internal)?;
    let user_id = Uuid::now_v7();

    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, email, name, password_hash) VALUES ($1, $2, $3, $4) \
         RETURNING id, email, name, password_hash, created_at",
    )
    .bind(user_id)
    .bind(&email)
    .bind(name)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::Conflict {
                    message: "Email already registered".to_string(),
                    field: Some("email".to_string()),
                };
            }
        }
        AppError::Database(e)
    })?;

    tracing::info!(user_id = %row.id, "registered user");
    Ok((StatusCode::CREATED, Json(row.into_response_body())))
}

// ──────────────────────────────────────────────
// POST /auth/login
// ──────────────────────────────────────────────

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = taskdeck_core::error::ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = req.email.trim().to_lowercase();

    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.db)
    .await?;

    // unknown email and wrong password produce the same response
    let Some(user) = row else {
        return Err(invalid_credentials());
    };
    let verified =
        auth::verify_password(&req.password, &user.password_hash).map_err(AppError::Internal)?;
    if !verified {
        return Err(invalid_credentials());
    }

    let access_token = state.jwt.issue(
        &user.id.to_string(),
        Some(user.email.clone()),
        Some(user.name.clone()),
    )?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: TOKEN_TTL_SECS,
    }))
}

// ──────────────────────────────────────────────
// GET /auth/me
// ──────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current token identity", body = AuthenticatedUser),
        (status = 401, description = "Missing or invalid token", body = taskdeck_core::error::ApiError)
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized {
        code: codes::INVALID_CREDENTIALS,
        message: "Invalid email or password".to_string(),
        docs_hint: None,
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let well_formed = email.contains('@')
        && !email.starts_with('@')
        && !email.ends_with('@')
        && !email.contains(char::is_whitespace);
    if !well_formed {
        return Err(AppError::Validation {
            message: "email must be a valid email address".to_string(),
            field: Some("email".to_string()),
            received: Some(serde_json::Value::String(email.to_string())),
        });
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::Validation {
            message: "password must be at least 8 characters".to_string(),
            field: Some("password".to_string()),
            received: None,
        });
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_response_body(self) -> UserResponse {
        UserResponse {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_is_checked() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("trailing@").is_err());
        assert!(validate_email("has space@example.com").is_err());
    }

    #[test]
    fn password_minimum_length_is_enforced() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }
}
