//! Derived stock computation.
//!
//! Stock is never persisted. It is recomputed on demand from the full set of
//! inventory movements ("T" in, "W" out) and committed orders referencing an
//! item:
//!
//! ```text
//! stock(item) = sum(in qty) - sum(out qty) - sum(order qty)
//! ```
//!
//! The pure functions here operate on already-fetched rows; the async
//! wrappers fetch the rows for one item (or a batch of items) over any
//! sea-orm connection, so they can run inside the services' transactions.

use std::collections::HashMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::entities::inventory_movement::{self, MovementKind};
use crate::entities::order;
use crate::errors::ServiceError;

/// Computes the current stock for a single item from its movement and order
/// rows. Summation order is irrelevant; inputs are not mutated.
///
/// Rows with an unrecognized movement kind contribute nothing.
pub fn compute_stock(movements: &[inventory_movement::Model], orders: &[order::Model]) -> i64 {
    let mut stock: i64 = 0;

    for movement in movements {
        match movement.kind() {
            Some(MovementKind::In) => stock += i64::from(movement.quantity),
            Some(MovementKind::Out) => stock -= i64::from(movement.quantity),
            None => {}
        }
    }

    for order in orders {
        stock -= i64::from(order.quantity);
    }

    stock
}

/// Batched variant of [`compute_stock`]: groups rows by owning item id and
/// applies the single-item computation per group. Ids with no matching rows
/// map to 0; rows for items outside `item_ids` are ignored.
pub fn compute_stock_for_items(
    item_ids: &[i64],
    movements: &[inventory_movement::Model],
    orders: &[order::Model],
) -> HashMap<i64, i64> {
    let mut stocks: HashMap<i64, i64> = item_ids.iter().map(|id| (*id, 0)).collect();

    for movement in movements {
        if let Some(stock) = stocks.get_mut(&movement.item_id) {
            match movement.kind() {
                Some(MovementKind::In) => *stock += i64::from(movement.quantity),
                Some(MovementKind::Out) => *stock -= i64::from(movement.quantity),
                None => {}
            }
        }
    }

    for order in orders {
        if let Some(stock) = stocks.get_mut(&order.item_id) {
            *stock -= i64::from(order.quantity);
        }
    }

    stocks
}

/// Fetches all rows referencing `item_id` and computes its current stock.
pub async fn item_stock<C: ConnectionTrait>(conn: &C, item_id: i64) -> Result<i64, ServiceError> {
    let movements = inventory_movement::Entity::find()
        .filter(inventory_movement::Column::ItemId.eq(item_id))
        .all(conn)
        .await?;
    let orders = order::Entity::find()
        .filter(order::Column::ItemId.eq(item_id))
        .all(conn)
        .await?;

    Ok(compute_stock(&movements, &orders))
}

/// Fetches rows for a batch of items with two `IN` queries and computes the
/// stock of each. Used by item listings to avoid a query pair per row.
pub async fn stock_for_items<C: ConnectionTrait>(
    conn: &C,
    item_ids: &[i64],
) -> Result<HashMap<i64, i64>, ServiceError> {
    if item_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let movements = inventory_movement::Entity::find()
        .filter(inventory_movement::Column::ItemId.is_in(item_ids.iter().copied()))
        .all(conn)
        .await?;
    let orders = order::Entity::find()
        .filter(order::Column::ItemId.is_in(item_ids.iter().copied()))
        .all(conn)
        .await?;

    Ok(compute_stock_for_items(item_ids, &movements, &orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn movement(item_id: i64, kind: MovementKind, quantity: i32) -> inventory_movement::Model {
        inventory_movement::Model {
            id: 0,
            item_id,
            kind: kind.as_str().to_string(),
            quantity,
            created_at: Utc::now(),
        }
    }

    fn an_order(order_no: &str, item_id: i64, quantity: i32) -> order::Model {
        order::Model {
            order_no: order_no.to_string(),
            item_id,
            quantity,
            price: 100,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_inputs_give_zero() {
        assert_eq!(compute_stock(&[], &[]), 0);
    }

    #[test]
    fn in_minus_out_minus_orders() {
        let movements = vec![
            movement(1, MovementKind::In, 10),
            movement(1, MovementKind::Out, 3),
        ];
        let orders = vec![an_order("ORD-1", 1, 2)];
        assert_eq!(compute_stock(&movements, &orders), 5);
    }

    #[test]
    fn stock_can_go_negative_from_history() {
        // The calculator reports whatever the rows say; only the admission
        // rules keep new mutations from creating this state.
        let movements = vec![movement(1, MovementKind::Out, 4)];
        assert_eq!(compute_stock(&movements, &[]), -4);
    }

    #[test]
    fn unknown_kind_rows_are_skipped() {
        let mut bad = movement(1, MovementKind::In, 10);
        bad.kind = "X".to_string();
        assert_eq!(compute_stock(&[bad], &[]), 0);
    }

    #[test]
    fn batched_maps_absent_ids_to_zero() {
        let stocks = compute_stock_for_items(&[1, 2], &[], &[]);
        assert_eq!(stocks.get(&1), Some(&0));
        assert_eq!(stocks.get(&2), Some(&0));
    }

    #[test]
    fn batched_ignores_rows_outside_id_set() {
        let movements = vec![
            movement(1, MovementKind::In, 10),
            movement(99, MovementKind::In, 7),
        ];
        let stocks = compute_stock_for_items(&[1], &movements, &[]);
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks.get(&1), Some(&10));
    }

    fn movements_strategy() -> impl Strategy<Value = Vec<inventory_movement::Model>> {
        prop::collection::vec((1i64..4, prop::bool::ANY, 0i32..1_000), 0..32).prop_map(|rows| {
            rows.into_iter()
                .map(|(item_id, is_in, quantity)| {
                    let kind = if is_in {
                        MovementKind::In
                    } else {
                        MovementKind::Out
                    };
                    movement(item_id, kind, quantity)
                })
                .collect()
        })
    }

    fn orders_strategy() -> impl Strategy<Value = Vec<order::Model>> {
        prop::collection::vec((1i64..4, 1i32..1_000), 0..16).prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (item_id, quantity))| an_order(&format!("ORD-{i}"), item_id, quantity))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn invariant_under_permutation(
            movements in movements_strategy(),
            orders in orders_strategy(),
        ) {
            let expected = compute_stock(&movements, &orders);

            let mut reversed_movements = movements.clone();
            reversed_movements.reverse();
            let mut reversed_orders = orders.clone();
            reversed_orders.reverse();

            prop_assert_eq!(compute_stock(&reversed_movements, &reversed_orders), expected);
        }

        #[test]
        fn batched_agrees_with_per_item(
            movements in movements_strategy(),
            orders in orders_strategy(),
        ) {
            let item_ids: Vec<i64> = (1..4).collect();
            let batched = compute_stock_for_items(&item_ids, &movements, &orders);

            for id in &item_ids {
                let own_movements: Vec<_> = movements
                    .iter()
                    .filter(|m| m.item_id == *id)
                    .cloned()
                    .collect();
                let own_orders: Vec<_> =
                    orders.iter().filter(|o| o.item_id == *id).cloned().collect();

                prop_assert_eq!(
                    batched.get(id).copied(),
                    Some(compute_stock(&own_movements, &own_orders))
                );
            }
        }
    }
}
