use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use metrics::counter;

mod accounting;
mod clock;
mod entitlement;
mod locks;
mod premium;
mod record;
pub mod redis_store;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entitlement::{AllowReason, Admission, EntitlementDecision, LimitReached, MeteringConfig};
pub use locks::{Reservation, UidGuard, UidLocks};
pub use premium::{PremiumConfig, PremiumGrant};
pub use record::{NewUsageRecord, UsageRecord, UsageRecordUpdate};
pub use redis_store::RedisUsageStore;
pub use store::{InMemoryUsageStore, UsageRecordStore};

/// Metrics for the usage meter
#[derive(Debug, Default)]
pub struct UsageMeterMetrics {
    allowed: AtomicU64,
    denied: AtomicU64,
    ad_credits: AtomicU64,
    degraded: AtomicU64,
    consumption_recorded: AtomicU64,
    consumption_skipped: AtomicU64,
    premium_grants: AtomicU64,
}

impl UsageMeterMetrics {
    pub fn record_decision(&self, decision: &EntitlementDecision) {
        match decision {
            EntitlementDecision::Allow(admission) => {
                self.allowed.fetch_add(1, Ordering::Relaxed);
                let reason: &'static str = admission.reason().into();
                counter!(
                    "mixly_entitlement_decisions",
                    "decision" => "allow",
                    "reason" => reason
                )
                .increment(1);
            }
            EntitlementDecision::Deny(_) => {
                self.denied.fetch_add(1, Ordering::Relaxed);
                counter!(
                    "mixly_entitlement_decisions",
                    "decision" => "deny",
                    "reason" => "limit_reached"
                )
                .increment(1);
            }
        }
    }

    pub fn record_ad_credit(&self) {
        self.ad_credits.fetch_add(1, Ordering::Relaxed);
        counter!("mixly_ad_credits").increment(1);
    }

    pub fn record_degraded(&self) {
        self.degraded.fetch_add(1, Ordering::Relaxed);
        counter!("mixly_degraded_mode_events").increment(1);
    }

    pub fn record_consumption(&self) {
        self.consumption_recorded.fetch_add(1, Ordering::Relaxed);
        counter!("mixly_consumption_recorded").increment(1);
    }

    pub fn record_consumption_skipped(&self) {
        self.consumption_skipped.fetch_add(1, Ordering::Relaxed);
        counter!("mixly_consumption_skipped").increment(1);
    }

    pub fn record_premium_grant(&self) {
        self.premium_grants.fetch_add(1, Ordering::Relaxed);
        counter!("mixly_premium_grants").increment(1);
    }

    pub fn allowed(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn denied(&self) -> u64 {
        self.denied.load(Ordering::Relaxed)
    }

    pub fn ad_credits(&self) -> u64 {
        self.ad_credits.load(Ordering::Relaxed)
    }

    pub fn degraded(&self) -> u64 {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn consumption_recorded(&self) -> u64 {
        self.consumption_recorded.load(Ordering::Relaxed)
    }

    pub fn consumption_skipped(&self) -> u64 {
        self.consumption_skipped.load(Ordering::Relaxed)
    }

    pub fn premium_grants(&self) -> u64 {
        self.premium_grants.load(Ordering::Relaxed)
    }
}

/// Entitlement engine, usage accounting and premium upgrades over one shared store.
///
/// Every mutation of a uid's record happens while holding that uid's slot in `locks`.
/// The serialization is per process: several gateway replicas sharing a Redis store
/// only get per-call atomicity from the store scripts.
pub struct UsageMeter {
    store: Arc<dyn UsageRecordStore>,
    locks: UidLocks,
    clock: Arc<dyn Clock>,
    config: MeteringConfig,
    premium: PremiumConfig,
    metrics: UsageMeterMetrics,
}

impl UsageMeter {
    pub fn new(
        store: Arc<dyn UsageRecordStore>,
        config: MeteringConfig,
        premium: PremiumConfig,
    ) -> Self {
        Self {
            store,
            locks: UidLocks::new(),
            clock: Arc::new(SystemClock),
            config,
            premium,
            metrics: UsageMeterMetrics::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &MeteringConfig {
        &self.config
    }

    pub fn metrics(&self) -> &UsageMeterMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &Arc<dyn UsageRecordStore> {
        &self.store
    }

    /// Drops lock slots for uids with no pending work
    pub fn prune_idle_locks(&self) -> usize {
        self.locks.prune_idle()
    }
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("store", &self.store.backend_name())
            .field("config", &self.config)
            .field("premium", &self.premium)
            .finish_non_exhaustive()
    }
}
