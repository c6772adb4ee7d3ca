use crate::{
    db::DbPool,
    entities::{
        inventory_movement::{self, MovementKind},
        item,
    },
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

/// Request/response types for the inventory service
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct MovementPayload {
    pub item_id: i64,
    #[validate(range(min = 0, message = "Quantity must be zero or positive"))]
    pub quantity: i32,
    pub kind: MovementKind,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MovementResponse {
    pub id: i64,
    pub item_id: i64,
    pub quantity: i32,
    pub kind: MovementKind,
}

/// Decides whether writing a movement with the given target state is
/// admissible. `available` must already exclude the movement being replaced
/// when this is an update, so the check reflects the post-mutation state.
fn admit_movement_write(
    item_id: i64,
    kind: MovementKind,
    quantity: i32,
    available: i64,
) -> Result<(), ServiceError> {
    if kind == MovementKind::Out && available < i64::from(quantity) {
        return Err(ServiceError::InsufficientStock { item_id, available });
    }
    Ok(())
}

/// Decides whether removing a movement from its item is admissible: taking
/// away a stock-in must not leave the item's stock negative. Removing a
/// withdrawal only increases stock and is always admissible.
fn admit_movement_removal(
    movement: &inventory_movement::Model,
    current_stock: i64,
) -> Result<(), ServiceError> {
    if movement.kind() == Some(MovementKind::In) && current_stock < i64::from(movement.quantity) {
        return Err(ServiceError::InsufficientStock {
            item_id: movement.item_id,
            available: current_stock,
        });
    }
    Ok(())
}

/// Returns the movement's signed contribution to its item's stock.
fn movement_effect(movement: &inventory_movement::Model) -> i64 {
    match movement.kind() {
        Some(MovementKind::In) => i64::from(movement.quantity),
        Some(MovementKind::Out) => -i64::from(movement.quantity),
        None => 0,
    }
}

/// Service for managing inventory movements under the stock admission rules.
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    locks: ItemLocks,
}

impl InventoryService {
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

    /// Lists movements with pagination.
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<MovementResponse>, u64), ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);

        let paginator = inventory_movement::Entity::find()
            .order_by_asc(inventory_movement::Column::Id)
            .paginate(db, per_page);

        let total = paginator.num_items().await?;
        let movements = paginator.fetch_page(page - 1).await?;

        let responses = movements
            .into_iter()
            .map(model_to_response)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((responses, total))
    }

    /// Retrieves a single movement.
    #[instrument(skip(self), fields(movement_id = %movement_id))]
    pub async fn get_movement(&self, movement_id: i64) -> Result<MovementResponse, ServiceError> {
        let db = &*self.db_pool;

        let model = inventory_movement::Entity::find_by_id(movement_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Inventory with id {movement_id} not found"))
            })?;

        model_to_response(model)
    }

    /// Creates a new movement (no id supplied) or fully replaces an existing
    /// one — kind, quantity, and owning item may all change.
    ///
    /// Admission always validates the hypothetical post-mutation state: on
    /// update the movement being replaced is excluded from the availability
    /// computation first, and a stock-in moved off an item must not leave
    /// that item negative.
    #[instrument(skip(self, payload), fields(movement_id = ?movement_id, item_id = %payload.item_id))]
    pub async fn save_movement(
        &self,
        movement_id: Option<i64>,
        payload: MovementPayload,
    ) -> Result<MovementResponse, ServiceError> {
        payload.validate()?;

        // Locks come before any read the admission depends on. For an update
        // the lock set itself depends on the row's current owner, so the row
        // is read again once the locks are held and the set re-derived if
        // the owner moved in between.
        let db = &*self.db_pool;
        let (existing, _guards) = match movement_id {
            None => {
                let guards = self
                    .locks
                    .acquire_pair(payload.item_id, payload.item_id)
                    .await;
                (None, guards)
            }
            Some(id) => loop {
                let current = inventory_movement::Entity::find_by_id(id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Inventory not found with ID: {id}"))
                    })?;
                let guards = self
                    .locks
                    .acquire_pair(payload.item_id, current.item_id)
                    .await;
                let locked = inventory_movement::Entity::find_by_id(id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Inventory not found with ID: {id}"))
                    })?;
                if locked.item_id == current.item_id {
                    break (Some(locked), guards);
                }
            },
        };

        let txn = db.begin().await?;

        item::Entity::find_by_id(payload.item_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item not found with ID: {}", payload.item_id))
            })?;

        let mut available = stock::item_stock(&txn, payload.item_id).await?;
        if let Some(movement) = &existing {
            if movement.item_id == payload.item_id {
                available -= movement_effect(movement);
            } else {
                // Moving the row to another item removes it from the source
                // item, which is subject to the same rule as a delete.
                let source_stock = stock::item_stock(&txn, movement.item_id).await?;
                admit_movement_removal(movement, source_stock)?;
            }
        }

        admit_movement_write(payload.item_id, payload.kind, payload.quantity, available)?;

        let (saved, created) = match existing {
            Some(movement) => {
                let mut active: inventory_movement::ActiveModel = movement.into();
                active.item_id = Set(payload.item_id);
                active.kind = Set(payload.kind.as_str().to_string());
                active.quantity = Set(payload.quantity);
                (active.update(&txn).await?, false)
            }
            None => {
                let active = inventory_movement::ActiveModel {
                    item_id: Set(payload.item_id),
                    kind: Set(payload.kind.as_str().to_string()),
                    quantity: Set(payload.quantity),
                    ..Default::default()
                };
                (active.insert(&txn).await?, true)
            }
        };

        txn.commit().await?;

        info!(movement_id = %saved.id, item_id = %saved.item_id, created = created, "Inventory movement saved");
        self.emit(StockEvent::MovementRecorded {
            movement_id: saved.id,
            item_id: saved.item_id,
        })
        .await;

        model_to_response(saved)
    }

    /// Deletes a movement. Removing a stock-in is rejected when it would
    /// drive the item's stock negative; removing a withdrawal always
    /// succeeds.
    #[instrument(skip(self), fields(movement_id = %movement_id))]
    pub async fn delete_movement(&self, movement_id: i64) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        // Same lock-then-reread dance as the save path: the owner decides
        // the lock key, and it may change before the lock is held.
        let (movement, _guard) = loop {
            let current = inventory_movement::Entity::find_by_id(movement_id)
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Inventory with id {movement_id} not found"))
                })?;
            let guard = self.locks.acquire(current.item_id).await;
            let locked = inventory_movement::Entity::find_by_id(movement_id)
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Inventory with id {movement_id} not found"))
                })?;
            if locked.item_id == current.item_id {
                break (locked, guard);
            }
        };

        let txn = db.begin().await?;

        let current_stock = stock::item_stock(&txn, movement.item_id).await?;
        admit_movement_removal(&movement, current_stock)?;

        inventory_movement::Entity::delete_by_id(movement.id)
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!(movement_id = %movement_id, item_id = %movement.item_id, "Inventory movement deleted");
        self.emit(StockEvent::MovementDeleted {
            movement_id,
            item_id: movement.item_id,
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

fn model_to_response(model: inventory_movement::Model) -> Result<MovementResponse, ServiceError> {
    // The calculator skips rows with an unknown kind; reporting one as a
    // stock-in would misstate what it contributes, so surface it instead.
    let kind = model.kind().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Inventory movement {} has unrecognized kind '{}'",
            model.id, model.kind
        ))
    })?;
    Ok(MovementResponse {
        id: model.id,
        item_id: model.item_id,
        quantity: model.quantity,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, DbConfig, DbPool};
    use crate::migrator::Migrator;
    use chrono::Utc;
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

    fn movement(item_id: i64, kind: MovementKind, quantity: i32) -> inventory_movement::Model {
        inventory_movement::Model {
            id: 1,
            item_id,
            kind: kind.as_str().to_string(),
            quantity,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stock_in_is_always_admissible() {
        assert!(admit_movement_write(1, MovementKind::In, 1_000, 0).is_ok());
        assert!(admit_movement_write(1, MovementKind::In, 0, -5).is_ok());
    }

    #[test]
    fn withdrawal_beyond_stock_is_rejected() {
        let err = admit_movement_write(1, MovementKind::Out, 11, 10).unwrap_err();
        match err {
            ServiceError::InsufficientStock { item_id, available } => {
                assert_eq!(item_id, 1);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn withdrawal_of_exactly_available_stock_is_admissible() {
        assert!(admit_movement_write(1, MovementKind::Out, 10, 10).is_ok());
    }

    #[test]
    fn removing_stock_in_that_backs_current_stock_is_rejected() {
        // stock 5, movement brought in 10: removal would leave -5.
        let err = admit_movement_removal(&movement(1, MovementKind::In, 10), 5).unwrap_err();
        match err {
            ServiceError::InsufficientStock { item_id, available } => {
                assert_eq!(item_id, 1);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn removing_stock_in_fully_covered_by_stock_is_admissible() {
        assert!(admit_movement_removal(&movement(1, MovementKind::In, 10), 10).is_ok());
    }

    #[test]
    fn removing_withdrawal_is_always_admissible() {
        assert!(admit_movement_removal(&movement(1, MovementKind::Out, 999), -4).is_ok());
    }

    #[test]
    fn movement_effect_is_signed() {
        assert_eq!(movement_effect(&movement(1, MovementKind::In, 4)), 4);
        assert_eq!(movement_effect(&movement(1, MovementKind::Out, 4)), -4);
    }

    #[test]
    fn response_mapping_surfaces_corrupt_kind() {
        let mut row = movement(1, MovementKind::In, 3);
        row.kind = "X".to_string();
        assert!(matches!(
            model_to_response(row),
            Err(ServiceError::InternalError(_))
        ));
    }

    #[tokio::test]
    async fn cross_item_move_waits_for_the_current_owners_lock() {
        let db = test_db().await;
        let locks = ItemLocks::new();
        let service = InventoryService::new(db.clone(), None, locks.clone());

        let source = item::ActiveModel {
            name: Set("widget".to_string()),
            price: Set(100),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();
        let target = item::ActiveModel {
            name: Set("gadget".to_string()),
            price: Set(100),
            ..Default::default()
        }
        .insert(&*db)
        .await
        .unwrap();

        let recorded = service
            .save_movement(
                None,
                MovementPayload {
                    item_id: source.id,
                    quantity: 5,
                    kind: MovementKind::In,
                },
            )
            .await
            .unwrap();

        // Reassigning the movement validates its removal against the source
        // item's stock, so it must serialize on the source item's lock.
        let guard = locks.acquire(source.id).await;
        let task = tokio::spawn({
            let service = service.clone();
            let target_id = target.id;
            let movement_id = recorded.id;
            async move {
                service
                    .save_movement(
                        Some(movement_id),
                        MovementPayload {
                            item_id: target_id,
                            quantity: 5,
                            kind: MovementKind::In,
                        },
                    )
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        drop(guard);
        let moved = task.await.unwrap().unwrap();
        assert_eq!(moved.item_id, target.id);
    }
}
