//! Domain events emitted after successful mutations.
//!
//! Delivery is best-effort: a full or closed channel never fails the
//! mutation that produced the event.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub enum StockEvent {
    ItemCreated { item_id: i64 },
    ItemUpdated { item_id: i64 },
    ItemDeleted { item_id: i64 },
    MovementRecorded { movement_id: i64, item_id: i64 },
    MovementDeleted { movement_id: i64, item_id: i64 },
    OrderPlaced { order_no: String, item_id: i64 },
    OrderUpdated { order_no: String, item_id: i64 },
    OrderDeleted { order_no: String },
}

/// Cloneable sending half of the event channel.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<StockEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<StockEvent>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, event: StockEvent) -> Result<(), mpsc::error::SendError<StockEvent>> {
        self.tx.send(event).await
    }
}

/// Consumes events until every sender is dropped. Spawned once at startup.
pub async fn process_events(mut rx: mpsc::Receiver<StockEvent>) {
    while let Some(event) = rx.recv().await {
        info!(event = ?event, "processing domain event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_flow_through_the_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(StockEvent::ItemCreated { item_id: 1 })
            .await
            .unwrap();

        match rx.recv().await {
            Some(StockEvent::ItemCreated { item_id }) => assert_eq!(item_id, 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
