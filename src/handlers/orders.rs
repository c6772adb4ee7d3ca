use crate::{
    errors::ServiceError,
    handlers::ListParams,
    services::orders::{OrderPayload, OrderResponse},
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
pub struct SaveOrderParams {
    pub order_no: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(save_order))
        .route("/:order_no", get(get_order).delete(delete_order))
}

/// List orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    params(ListParams),
    responses(
        (status = 200, description = "Orders retrieved successfully"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let per_page = params.per_page(state.config.default_page_size);
    let (orders, total) = state.orders.list_orders(params.page(), per_page).await?;

    Ok(Json(json!({
        "success": true,
        "data": orders,
        "total": total,
        "page": params.page(),
        "per_page": per_page,
    })))
}

/// Get a single order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_no}",
    params(("order_no" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = OrderResponse),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.get_order(&order_no).await?;
    Ok(Json(json!({ "success": true, "data": order })))
}

/// Place an order, or fully replace one when `order_no` is supplied
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    params(SaveOrderParams),
    request_body = OrderPayload,
    responses(
        (status = 200, description = "Order saved successfully", body = OrderResponse),
        (status = 400, description = "Invalid payload, price mismatch, or insufficient stock"),
        (status = 404, description = "Order or item not found"),
        (status = 409, description = "Order number already exists"),
    ),
    tag = "orders"
)]
pub async fn save_order(
    State(state): State<AppState>,
    Query(params): Query<SaveOrderParams>,
    Json(payload): Json<OrderPayload>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.orders.save_order(params.order_no, payload).await?;
    Ok(Json(json!({ "success": true, "data": order })))
}

/// Delete an order, returning its quantity to stock
#[utoipa::path(
    delete,
    path = "/api/v1/orders/{order_no}",
    params(("order_no" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Order deleted successfully"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    state.orders.delete_order(&order_no).await?;
    Ok(Json(json!({ "success": true, "data": null })))
}
