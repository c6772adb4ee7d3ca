use crate::{
    db::DbPool,
    entities::{inventory_movement, item, order},
    errors::ServiceError,
    events::{EventSender, StockEvent},
    services::ItemLocks,
    stock,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

/// Request/response types for the item service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ItemPayload {
    #[validate(length(min = 1, message = "Name is mandatory"))]
    pub name: String,
    #[validate(range(min = 1, message = "Price must be positive"))]
    pub price: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ItemResponse {
    pub id: i64,
    pub name: String,
    pub price: i32,
    /// Derived stock, recomputed from the item's movements and orders.
    pub stock: i64,
}

/// Service for managing items and their referential-integrity guard.
#[derive(Clone)]
pub struct ItemService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: ItemLocks,
}

impl ItemService {
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

    /// Lists items with pagination; each row carries its computed stock,
    /// resolved with the batched calculator over the page's ids.
    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ItemResponse>, u64), ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = item::Entity::find()
            .order_by_asc(item::Column::Id)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let stocks = stock::stock_for_items(db, &item_ids).await?;

        let responses = items
            .into_iter()
            .map(|model| {
                let stock = stocks.get(&model.id).copied().unwrap_or(0);
                model_to_response(model, stock)
            })
            .collect();

        Ok((responses, total))
    }

    /// Retrieves a single item with its computed stock.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn get_item(&self, item_id: i64) -> Result<ItemResponse, ServiceError> {
        let db = &*self.db_pool;

        let model = item::Entity::find_by_id(item_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Item with id {item_id} not found")))?;

        let stock = stock::item_stock(db, item_id).await?;
        Ok(model_to_response(model, stock))
    }

    /// Creates a new item (no id supplied) or fully replaces an existing one.
    #[instrument(skip(self, payload), fields(item_id = ?item_id))]
    pub async fn save_item(
        &self,
        item_id: Option<i64>,
        payload: ItemPayload,
    ) -> Result<ItemResponse, ServiceError> {
        payload.validate()?;

        // Replacing an item changes the price that order admission checks
        // against, so updates join the per-item critical section. Creates
        // have no id to contend on yet.
        let _guard = match item_id {
            Some(id) => Some(self.locks.acquire(id).await),
            None => None,
        };

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let (saved, created) = match item_id {
            Some(id) => {
                let existing = item::Entity::find_by_id(id).one(&txn).await?.ok_or_else(|| {
                    ServiceError::NotFound(format!("Item not found with ID: {id}"))
                })?;

                let mut active: item::ActiveModel = existing.into();
                active.name = Set(payload.name);
                active.price = Set(payload.price);
                (active.update(&txn).await?, false)
            }
            None => {
                let active = item::ActiveModel {
                    name: Set(payload.name),
                    price: Set(payload.price),
                    ..Default::default()
                };
                (active.insert(&txn).await?, true)
            }
        };

        let stock = stock::item_stock(&txn, saved.id).await?;
        txn.commit().await?;

        info!(item_id = %saved.id, created = created, "Item saved");
        self.emit(if created {
            StockEvent::ItemCreated { item_id: saved.id }
        } else {
            StockEvent::ItemUpdated { item_id: saved.id }
        })
        .await;

        Ok(model_to_response(saved, stock))
    }

    /// Deletes an item, unless any inventory movement or order still
    /// references it.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn delete_item(&self, item_id: i64) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(item_id).await;

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let existing = item::Entity::find_by_id(item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Item not found with ID: {item_id}")))?;

        let movement_refs = inventory_movement::Entity::find()
            .filter(inventory_movement::Column::ItemId.eq(item_id))
            .count(&txn)
            .await?;
        if movement_refs > 0 {
            warn!(item_id = %item_id, "Item delete blocked by inventory references");
            return Err(ServiceError::ReferentialIntegrityViolation(
                "Item has associated inventory records".to_string(),
            ));
        }

        let order_refs = order::Entity::find()
            .filter(order::Column::ItemId.eq(item_id))
            .count(&txn)
            .await?;
        if order_refs > 0 {
            warn!(item_id = %item_id, "Item delete blocked by order references");
            return Err(ServiceError::ReferentialIntegrityViolation(
                "Item has associated order records".to_string(),
            ));
        }

        item::Entity::delete_by_id(existing.id).exec(&txn).await?;
        txn.commit().await?;

        info!(item_id = %item_id, "Item deleted");
        self.emit(StockEvent::ItemDeleted { item_id }).await;
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

fn model_to_response(model: item::Model, stock: i64) -> ItemResponse {
    ItemResponse {
        id: model.id,
        name: model.name,
        price: model.price,
        stock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig};
    use crate::migrator::Migrator;
    use sea_orm_migration::MigratorTrait;
    use std::time::Duration;

    async fn test_db() -> Arc<DbPool> {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = establish_connection_with_config(&cfg).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        Arc::new(db)
    }

    #[tokio::test]
    async fn item_update_waits_for_the_item_lock() {
        let db = test_db().await;
        let locks = ItemLocks::new();
        let service = ItemService::new(db, None, locks.clone());

        let created = service
            .save_item(
                None,
                ItemPayload {
                    name: "widget".to_string(),
                    price: 100,
                },
            )
            .await
            .unwrap();

        // A price change must serialize with order placement against the
        // same item, which holds this lock while it validates the price.
        let guard = locks.acquire(created.id).await;
        let task = tokio::spawn({
            let service = service.clone();
            let item_id = created.id;
            async move {
                service
                    .save_item(
                        Some(item_id),
                        ItemPayload {
                            name: "widget".to_string(),
                            price: 150,
                        },
                    )
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        drop(guard);
        let updated = task.await.unwrap().unwrap();
        assert_eq!(updated.price, 150);
    }

    #[test]
    fn model_to_response_carries_computed_stock() {
        let model = item::Model {
            id: 7,
            name: "widget".to_string(),
            price: 100,
        };

        let response = model_to_response(model, 42);
        assert_eq!(response.id, 7);
        assert_eq!(response.name, "widget");
        assert_eq!(response.price, 100);
        assert_eq!(response.stock, 42);
    }

    #[test]
    fn payload_validation_rejects_bad_input() {
        let empty_name = ItemPayload {
            name: "".to_string(),
            price: 100,
        };
        assert!(empty_name.validate().is_err());

        let zero_price = ItemPayload {
            name: "widget".to_string(),
            price: 0,
        };
        assert!(zero_price.validate().is_err());

        let ok = ItemPayload {
            name: "widget".to_string(),
            price: 1,
        };
        assert!(ok.validate().is_ok());
    }
}
