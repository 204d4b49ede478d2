use super::json_body;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::repository::{User, UserRepository};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[serde(default)]
    pub id_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: String,
    pub user: User,
    pub is_admin: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: User,
    pub is_admin: bool,
}

/// `POST /api/auth/google`
pub async fn login_with_google(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GoogleLoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let request = json_body(payload)?;
    let verifier = state.google_verifier.as_ref().ok_or_else(|| {
        log::error!("Google login requested but GOOGLE_CLIENT_ID is not set");
        AppError::AuthProvider("GOOGLE_CLIENT_ID 未設定".to_string())
    })?;

    let identity = verifier.verify(&request.id_token).await?;

    let users = state.user_repository();
    let user = users.upsert_user(&identity).await?;
    let expires_at = state
        .config
        .auth
        .session_expires_at(Utc::now())
        .ok_or_else(|| {
            log::error!(
                "auth.session_ttl_hours is out of range: {}",
                state.config.auth.session_ttl_hours
            );
            AppError::AuthProvider("auth.session_ttl_hours 設定錯誤".to_string())
        })?;
    let session = users.create_session(&user.id, expires_at).await?;

    log::info!("User {} logged in", user.id);

    let is_admin = state.config.auth.is_admin(user.email.as_deref());
    Ok(Json(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
        is_admin,
    }))
}

/// `GET /api/auth/session`
pub async fn current_session(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Json<SessionResponse> {
    let is_admin = state.config.auth.is_admin(auth.user.email.as_deref());
    Json(SessionResponse {
        user: auth.user,
        is_admin,
    })
}

/// `POST /api/auth/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<StatusCode, AppError> {
    state.user_repository().delete_session(&auth.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
