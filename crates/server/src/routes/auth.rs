//! Authentication API routes.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::middleware::auth::{clear_current_user, set_current_user};
use crate::models::CurrentUser;
use crate::services::auth::AuthService;
use crate::state::AppState;

/// Request body for registration and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Request body for changing the password.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Register a new customer account.
///
/// POST /api/auth/register
///
/// # Errors
///
/// Returns 400 for invalid email/weak password, 409 if the email is taken.
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<CurrentUser>)> {
    let auth = AuthService::new(state.pool());
    let user = auth.register(&body.email, &body.password).await?;

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    tracing::info!(user_id = user.id.as_i32(), "User registered");

    Ok((StatusCode::CREATED, Json(current)))
}

/// Login with email and password.
///
/// POST /api/auth/login
///
/// # Errors
///
/// Returns 401 on wrong credentials.
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<CurrentUser>> {
    let auth = AuthService::new(state.pool());
    let user = auth.login(&body.email, &body.password).await?;

    // New session id on privilege change to prevent fixation
    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    let current = CurrentUser::from(&user);
    set_current_user(&session, &current)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    Ok(Json(current))
}

/// Change the current user's password.
///
/// PUT /api/auth/password
///
/// # Errors
///
/// Returns 401 when the current password is wrong, 400 when the new one is
/// too weak.
pub async fn change_password(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    AuthService::new(state.pool())
        .change_password(user.id, &body.current_password, &body.new_password)
        .await?;

    tracing::info!(user_id = user.id.as_i32(), "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// Logout the current user.
///
/// POST /api/auth/logout
///
/// # Errors
///
/// Returns 500 if the session cannot be modified.
pub async fn logout(session: Session) -> Result<StatusCode> {
    clear_current_user(&session)
        .await
        .map_err(|e| AppError::Internal(format!("session error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

/// Get the currently logged-in user.
///
/// GET /api/auth/me
pub async fn me(RequireUser(user): RequireUser) -> Json<CurrentUser> {
    Json(user)
}
