use super::{json_body, parse_id};
use crate::auth::AuthUser;
use crate::error::AppError;
use crate::menu::StoredMenuItem;
use crate::repository::{MenuItemChanges, MenuItemRepository};
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;

/// `PUT /api/menu-items/:id`
pub async fn update_menu_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<MenuItemChanges>, JsonRejection>,
) -> Result<Json<StoredMenuItem>, AppError> {
    let id = parse_id(&id)?;
    let changes = json_body(payload)?.validated()?;

    let updated = state
        .menu_item_repository()
        .update_menu_item(id, changes, &auth.user.id)
        .await?;

    Ok(Json(updated))
}
