pub mod inventory;
pub mod items;
pub mod orders;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-item async locks.
///
/// Every stock-affecting mutation reads rows, validates against the computed
/// stock, and then writes. Those three steps are not atomic at the store
/// level, so all mutating service paths take the owning item's lock for the
/// whole read-validate-write sequence; concurrent mutations against the same
/// item serialize, mutations against different items do not.
#[derive(Clone, Default)]
pub struct ItemLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one item.
    pub async fn acquire(&self, item_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(item_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Acquires the locks for two items in ascending id order, so that two
    /// concurrent cross-item mutations can never deadlock. Returns a single
    /// guard when both ids are the same.
    pub async fn acquire_pair(
        &self,
        first: i64,
        second: i64,
    ) -> (OwnedMutexGuard<()>, Option<OwnedMutexGuard<()>>) {
        if first == second {
            return (self.acquire(first).await, None);
        }
        let (lo, hi) = if first < second {
            (first, second)
        } else {
            (second, first)
        };
        let lo_guard = self.acquire(lo).await;
        let hi_guard = self.acquire(hi).await;
        (lo_guard, Some(hi_guard))
    }
}
