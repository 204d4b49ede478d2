use super::json_body;
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::menu::{MenuProcessOutcome, MenuProcessRequest};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

/// `POST /api/process-menu`
pub async fn process_menu(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    payload: Result<Json<MenuProcessRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MenuProcessOutcome>), AppError> {
    let request = json_body(payload)?;
    let outcome = state
        .menu_service()
        .process_menu(request, &auth.user.id)
        .await?;

    Ok((StatusCode::CREATED, Json(outcome)))
}
