//! Per-document exclusive locks
//!
//! Each document id maps to its own mutex, created on first use and dropped
//! once nobody holds or waits on it. Locks on different ids never contend.
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct LockTable {
    slots: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

/// Holds the exclusive lock for one document until dropped.
pub struct DocumentGuard<'a> {
    table: &'a LockTable,
    id: u64,
    slot: Arc<Mutex<()>>,
    guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock for `id` is acquired.
    pub fn acquire(&self, id: u64) -> DocumentGuard<'_> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(id).or_default())
        };
        let guard = slot.lock_arc();

        DocumentGuard {
            table: self,
            id,
            slot,
            guard: Some(guard),
        }
    }

    /// Number of ids with a live lock slot.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        // New holders clone the slot under the table lock, so the count
        // cannot grow while we hold it.
        let mut slots = self.table.slots.lock();
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.id);
        }
    }
}
