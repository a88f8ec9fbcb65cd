use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serialization point and in-flight counter for one uid.
#[derive(Debug, Default)]
pub struct UidSlot {
    lock: Arc<Mutex<()>>,
    in_flight: AtomicU32,
}

impl UidSlot {
    /// Admitted requests that have been neither charged nor abandoned
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Registry of per-uid slots. Operations on different uids never contend.
#[derive(Debug, Default)]
pub struct UidLocks {
    slots: DashMap<String, Arc<UidSlot>>,
}

/// Held for the duration of a read-modify-write on one uid's record.
pub struct UidGuard {
    slot: Arc<UidSlot>,
    _guard: OwnedMutexGuard<()>,
}

impl UidGuard {
    pub fn in_flight(&self) -> u32 {
        self.slot.in_flight()
    }

    /// Counts one more admitted request against this uid until the returned
    /// reservation is released or dropped.
    pub fn reserve(&self) -> Reservation {
        self.slot.in_flight.fetch_add(1, Ordering::AcqRel);
        Reservation {
            slot: Some(Arc::clone(&self.slot)),
        }
    }
}

/// An admitted-but-not-yet-accounted unit of capacity.
#[derive(Debug)]
pub struct Reservation {
    slot: Option<Arc<UidSlot>>,
}

impl Reservation {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.in_flight.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl UidLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, uid: &str) -> Arc<UidSlot> {
        if let Some(slot) = self.slots.get(uid) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(uid.to_string()).or_default().value())
    }

    pub async fn acquire(&self, uid: &str) -> UidGuard {
        let slot = self.slot(uid);
        let guard = Arc::clone(&slot.lock).lock_owned().await;
        UidGuard {
            slot,
            _guard: guard,
        }
    }

    /// Drops slots nobody holds and with nothing in flight. Returns how many were removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|_, slot| Arc::strong_count(slot) > 1 || slot.in_flight() > 0);
        before.saturating_sub(self.slots.len())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
