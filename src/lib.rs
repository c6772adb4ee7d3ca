pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod stock;

use std::sync::Arc;

use axum::Router;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        inventory::InventoryService, items::ItemService, orders::OrderService, ItemLocks,
    },
};

/// Shared application state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub items: ItemService,
    pub inventory: InventoryService,
    pub orders: OrderService,
}

impl AppState {
    /// Wires up the services over a connected pool. The same lock registry
    /// is shared by all services so cross-resource mutations on one item
    /// serialize.
    pub fn new(db: Arc<DbPool>, config: AppConfig, event_sender: Option<Arc<EventSender>>) -> Self {
        let locks = ItemLocks::new();
        Self {
            items: ItemService::new(db.clone(), event_sender.clone(), locks.clone()),
            inventory: InventoryService::new(db.clone(), event_sender.clone(), locks.clone()),
            orders: OrderService::new(db.clone(), event_sender, locks),
            db,
            config,
        }
    }
}

/// Versioned API routes, nested under `/api/v1` by the caller.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/items", handlers::items::router())
        .nest("/inventory", handlers::inventory::router())
        .nest("/orders", handlers::orders::router())
}
