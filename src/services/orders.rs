use crate::{
    db::DbPool,
    entities::{item, order},
    errors::ServiceError,
    events::{EventSender, StockEvent},
    services::ItemLocks,
    stock,
};
use sea_orm::{
    ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Request/response types for the order service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderPayload {
    #[validate(length(min = 1, message = "Order number is mandatory"))]
    pub order_no: String,
    pub item_id: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub price: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub order_no: String,
    pub item_id: i64,
    pub quantity: i32,
    pub price: i32,
}

/// Decides whether an order against the item is admissible: the order price
/// must equal the item's current price, and the item must have enough stock.
/// `available` must already exclude the order being replaced on updates.
fn admit_order_write(
    item: &item::Model,
    available: i64,
    quantity: i32,
    price: i32,
) -> Result<(), ServiceError> {
    if price != item.price {
        return Err(ServiceError::PriceMismatch { item_id: item.id });
    }
    if available < i64::from(quantity) {
        return Err(ServiceError::InsufficientStock {
            item_id: item.id,
            available,
        });
    }
    Ok(())
}

/// Service for placing and managing orders against item stock.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: ItemLocks,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        locks: ItemLocks,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Lists orders with pagination.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = order::Entity::find()
            .order_by_asc(order::Column::OrderNo)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok((orders.into_iter().map(model_to_response).collect(), total))
    }

    /// Retrieves a single order.
    #[instrument(skip(self), fields(order_no = %order_no))]
    pub async fn get_order(&self, order_no: &str) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;

        let model = order::Entity::find_by_id(order_no.to_string())
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with number {order_no} not found"))
            })?;

        Ok(model_to_response(model))
    }

    /// Places a new order (no order number in the path) or fully replaces an
    /// existing one. On update the path identifies the order; the payload's
    /// `order_no` field is ignored and the number never changes.
    ///
    /// Admission validates the hypothetical post-mutation state: an update
    /// against the same item gets the replaced order's quantity back before
    /// the stock check.
    #[instrument(skip(self, payload), fields(order_no = ?order_no, item_id = %payload.item_id))]
    pub async fn save_order(
        &self,
        order_no: Option<String>,
        payload: OrderPayload,
    ) -> Result<OrderResponse, ServiceError> {
        payload.validate()?;

        // Locks come before any read the admission depends on. The replaced
        // order decides part of the lock set, so it is read again once the
        // locks are held and the set re-derived if its item changed in
        // between.
        let db = &*self.db_pool;
        let (existing, _guards) = match &order_no {
            None => {
                let guards = self
                    .locks
                    .acquire_pair(payload.item_id, payload.item_id)
                    .await;
                (None, guards)
            }
            Some(no) => loop {
                let current = order::Entity::find_by_id(no.clone())
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order not found with ID: {no}"))
                    })?;
                let guards = self
                    .locks
                    .acquire_pair(payload.item_id, current.item_id)
                    .await;
                let locked = order::Entity::find_by_id(no.clone())
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Order not found with ID: {no}"))
                    })?;
                if locked.item_id == current.item_id {
                    break (Some(locked), guards);
                }
            },
        };

        let txn = db.begin().await?;

        let item = item::Entity::find_by_id(payload.item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item not found with ID: {}", payload.item_id))
            })?;

        if existing.is_none() {
            let duplicate = order::Entity::find_by_id(payload.order_no.clone())
                .one(&txn)
                .await?;
            if duplicate.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "Order with number {} already exists",
                    payload.order_no
                )));
            }
        }

        let mut available = stock::item_stock(&txn, payload.item_id).await?;
        if let Some(order) = &existing {
            // An order only reserves stock on its own item; moving it to
            // another item frees the source unconditionally.
            if order.item_id == payload.item_id {
                available += i64::from(order.quantity);
            }
        }

        admit_order_write(&item, available, payload.quantity, payload.price)?;

        let (saved, created) = match existing {
            Some(order) => {
                let mut active: order::ActiveModel = order.into();
                active.item_id = Set(payload.item_id);
                active.quantity = Set(payload.quantity);
                active.price = Set(payload.price);
                (active.update(&txn).await?, false)
            }
            None => {
                let active = order::ActiveModel {
                    order_no: Set(payload.order_no.clone()),
                    item_id: Set(payload.item_id),
                    quantity: Set(payload.quantity),
                    price: Set(payload.price),
                    ..Default::default()
                };
                (active.insert(&txn).await?, true)
            }
        };

        txn.commit().await?;

        info!(order_no = %saved.order_no, item_id = %saved.item_id, created = created, "Order saved");
        self.emit(if created {
            StockEvent::OrderPlaced {
                order_no: saved.order_no.clone(),
                item_id: saved.item_id,
            }
        } else {
            StockEvent::OrderUpdated {
                order_no: saved.order_no.clone(),
                item_id: saved.item_id,
            }
        })
        .await;

        Ok(model_to_response(saved))
    }

    /// Deletes an order. Deletion only returns stock, so it is always
    /// admissible once the order exists.
    #[instrument(skip(self), fields(order_no = %order_no))]
    pub async fn delete_order(&self, order_no: &str) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        // Same lock-then-reread dance as the save path: the owning item
        // decides the lock key, and it may change before the lock is held.
        let (order, _guard) = loop {
            let current = order::Entity::find_by_id(order_no.to_string())
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Order with number {order_no} not found"))
                })?;
            let guard = self.locks.acquire(current.item_id).await;
            let locked = order::Entity::find_by_id(order_no.to_string())
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Order with number {order_no} not found"))
                })?;
            if locked.item_id == current.item_id {
                break (locked, guard);
            }
        };

        let txn = db.begin().await?;

        order::Entity::delete_by_id(order.order_no.clone())
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(order_no = %order_no, item_id = %order.item_id, "Order deleted");
        self.emit(StockEvent::OrderDeleted {
            order_no: order_no.to_string(),
        })
        .await;
        Ok(())
    }

    async fn emit(&self, event: StockEvent) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send domain event");
            }
        }
    }
}

fn model_to_response(model: order::Model) -> OrderResponse {
    OrderResponse {
        order_no: model.order_no,
        item_id: model.item_id,
        quantity: model.quantity,
        price: model.price,
    }
}
