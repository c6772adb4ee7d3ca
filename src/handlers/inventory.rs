use crate::{
    errors::ServiceError,
    handlers::ListParams,
    services::inventory::{MovementPayload, MovementResponse},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SaveMovementParams {
    pub id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_movements).post(save_movement))
        .route("/:id", get(get_movement).delete(delete_movement))
}

/// List inventory movements
#[utoipa::path(
    get,
    path = "/api/v1/inventory",
    params(ListParams),
    responses(
        (status = 200, description = "Movements retrieved successfully"),
    ),
    tag = "inventory"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let per_page = params.per_page(state.config.default_page_size);
    let (movements, total) = state.inventory.list_movements(params.page(), per_page).await?;

    Ok(Json(json!({
        "success": true,
        "data": movements,
        "total": total,
        "page": params.page(),
        "per_page": per_page,
    })))
}

/// Get a single inventory movement
#[utoipa::path(
    get,
    path = "/api/v1/inventory/{id}",
    params(("id" = i64, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Movement retrieved successfully", body = MovementResponse),
        (status = 404, description = "Movement not found"),
    ),
    tag = "inventory"
)]
pub async fn get_movement(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state.inventory.get_movement(id).await?;
    Ok(Json(json!({ "success": true, "data": movement })))
}

/// Record a movement, or fully replace one when `id` is supplied
#[utoipa::path(
    post,
    path = "/api/v1/inventory",
    params(SaveMovementParams),
    request_body = MovementPayload,
    responses(
        (status = 200, description = "Movement saved successfully", body = MovementResponse),
        (status = 400, description = "Invalid payload or insufficient stock"),
        (status = 404, description = "Movement or item not found"),
    ),
    tag = "inventory"
)]
pub async fn save_movement(
    State(state): State<AppState>,
    Query(params): Query<SaveMovementParams>,
    Json(payload): Json<MovementPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state.inventory.save_movement(params.id, payload).await?;
    Ok(Json(json!({ "success": true, "data": movement })))
}

/// Delete a movement when the item's stock can absorb its removal
#[utoipa::path(
    delete,
    path = "/api/v1/inventory/{id}",
    params(("id" = i64, Path, description = "Movement id")),
    responses(
        (status = 200, description = "Movement deleted successfully"),
        (status = 400, description = "Removal would drive stock negative"),
        (status = 404, description = "Movement not found"),
    ),
    tag = "inventory"
)]
pub async fn delete_movement(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state.inventory.delete_movement(id).await?;
    Ok(Json(json!({ "success": true, "data": null })))
}
