use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    entities::inventory_movement::MovementKind,
    errors::ErrorResponse,
    services::{
        inventory::{MovementPayload, MovementResponse},
        items::{ItemPayload, ItemResponse},
        orders::{OrderPayload, OrderResponse},
    },
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stockroom API",
        description = "Inventory and order management with derived stock accounting",
        version = env!("CARGO_PKG_VERSION"),
    ),
    paths(
        crate::handlers::items::list_items,
        crate::handlers::items::get_item,
        crate::handlers::items::save_item,
        crate::handlers::items::delete_item,
        crate::handlers::inventory::list_movements,
        crate::handlers::inventory::get_movement,
        crate::handlers::inventory::save_movement,
        crate::handlers::inventory::delete_movement,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::save_order,
        crate::handlers::orders::delete_order,
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
    ),
    components(schemas(
        ItemPayload,
        ItemResponse,
        MovementPayload,
        MovementResponse,
        MovementKind,
        OrderPayload,
        OrderResponse,
        ErrorResponse,
    )),
    tags(
        (name = "items", description = "Item catalog with derived stock"),
        (name = "inventory", description = "Stock-in and withdrawal movements"),
        (name = "orders", description = "Orders placed against item stock"),
        (name = "health", description = "Liveness and readiness probes"),
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_contains_all_resources() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/items"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/inventory"));
        assert!(paths.iter().any(|p| p.as_str() == "/api/v1/orders"));
        assert!(paths.iter().any(|p| p.as_str() == "/health"));
    }
}
