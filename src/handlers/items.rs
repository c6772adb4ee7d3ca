use crate::{
    errors::ServiceError,
    handlers::ListParams,
    services::items::{ItemPayload, ItemResponse},
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

/// Optional identity for the save endpoint: absent means create, present
/// means full replace of that item.
#[derive(Debug, Deserialize, IntoParams)]
pub struct SaveItemParams {
    pub id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(save_item))
        .route("/:id", get(get_item).delete(delete_item))
}

/// List items with their computed stock
#[utoipa::path(
    get,
    path = "/api/v1/items",
    params(ListParams),
    responses(
        (status = 200, description = "Items retrieved successfully"),
    ),
    tag = "items"
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let per_page = params.per_page(state.config.default_page_size);
    let (items, total) = state.items.list_items(params.page(), per_page).await?;

    Ok(Json(json!({
        "success": true,
        "data": items,
        "total": total,
        "page": params.page(),
        "per_page": per_page,
    })))
}

/// Get a single item with its computed stock
#[utoipa::path(
    get,
    path = "/api/v1/items/{id}",
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item retrieved successfully", body = ItemResponse),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.items.get_item(id).await?;
    Ok(Json(json!({ "success": true, "data": item })))
}

/// Create an item, or fully replace one when `id` is supplied
#[utoipa::path(
    post,
    path = "/api/v1/items",
    params(SaveItemParams),
    request_body = ItemPayload,
    responses(
        (status = 200, description = "Item saved successfully", body = ItemResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Item not found"),
    ),
    tag = "items"
)]
pub async fn save_item(
    State(state): State<AppState>,
    Query(params): Query<SaveItemParams>,
    Json(payload): Json<ItemPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.items.save_item(params.id, payload).await?;
    Ok(Json(json!({ "success": true, "data": item })))
}

/// Delete an item with no remaining references
#[utoipa::path(
    delete,
    path = "/api/v1/items/{id}",
    params(("id" = i64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item deleted successfully"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Item still referenced by movements or orders"),
    ),
    tag = "items"
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ServiceError> {
    state.items.delete_item(id).await?;
    Ok(Json(json!({ "success": true, "data": null })))
}
