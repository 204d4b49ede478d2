use super::parse_id;
use crate::auth::AdminUser;
use crate::error::AppError;
use crate::repository::{ShopRepository, ShopSummary, ShopWithItems};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

/// `GET /api/shops`
pub async fn list_shops(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ShopSummary>>, AppError> {
    Ok(Json(state.shop_repository().list_shops().await?))
}

/// `GET /api/shops/:id`
pub async fn get_shop(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ShopWithItems>, AppError> {
    let id = parse_id(&id)?;
    state
        .shop_repository()
        .get_shop_with_items(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("找不到該店家".to_string()))
}

/// `DELETE /api/shops/:id`（管理者のみ）
pub async fn delete_shop(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let id = parse_id(&id)?;
    state.shop_repository().delete_shop(id).await?;

    log::info!("Shop {id} deleted by admin {}", admin.user.id);
    Ok(Json(json!({ "message": "店家及其品項已刪除" })))
}
