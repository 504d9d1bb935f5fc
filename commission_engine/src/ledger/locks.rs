use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::trace;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>;

/// In-process mutual exclusion per partner.
///
/// A guard is held for the whole read-validate-write sequence of a ledger operation, so two operations on the same
/// partner never interleave inside this process. Clones share the same lock table. A partner's entry is removed when
/// the last guard for it is dropped and nobody is waiting, so the table only holds partners that are in use.
#[derive(Clone, Default)]
pub struct PartnerLocks {
    locks: LockTable,
}

impl PartnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, partner_id: i64) -> PartnerGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(partner_id).or_default())
        };
        trace!("🧾 Waiting for lock on partner #{partner_id}");
        let guard = lock.lock_owned().await;
        PartnerGuard { guard: Some(guard), partner_id, locks: Arc::clone(&self.locks) }
    }

    /// The number of partners with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a partner's lock until dropped.
pub struct PartnerGuard {
    guard: Option<OwnedMutexGuard<()>>,
    partner_id: i64,
    locks: LockTable,
}

impl Drop for PartnerGuard {
    fn drop(&mut self) {
        // Release the mutex first so that its reference no longer counts.
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Waiters clone the entry under the table lock, so a count of one means nobody else holds or wants it.
        if locks.get(&self.partner_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.partner_id);
            trace!("🧾 Dropped idle lock for partner #{}", self.partner_id);
        }
    }
}
