use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use tracing::{debug, info, warn};

use super::locks::{Reservation, UidGuard};
use super::record::{NewUsageRecord, UsageRecordUpdate};
use super::UsageMeter;
use crate::error::{Error, ErrorDetails};

/// Rewarded ads creditable per window.
pub const MAX_AD_TIERS: usize = 2;

/// Daily quota and the ad bonus schedule.
///
/// Each entry of `ad_bonuses` is the extra capacity granted by one more rewarded ad,
/// so the number of entries is also the per-window cap on ad credits.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct MeteringConfig {
    pub base_daily_limit: u32,
    pub ad_bonuses: Vec<u32>,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            base_daily_limit: 3,
            ad_bonuses: vec![2, 1],
        }
    }
}

impl MeteringConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.base_daily_limit == 0 {
            return Err(Error::new(ErrorDetails::Config {
                message: "`metering.base_daily_limit` must be greater than zero".to_string(),
            }));
        }
        if self.ad_bonuses.is_empty() {
            return Err(Error::new(ErrorDetails::Config {
                message: "`metering.ad_bonuses` must contain at least one bonus".to_string(),
            }));
        }
        if self.ad_bonuses.len() > MAX_AD_TIERS {
            return Err(Error::new(ErrorDetails::Config {
                message: format!(
                    "`metering.ad_bonuses` supports at most {MAX_AD_TIERS} bonuses, got {}",
                    self.ad_bonuses.len()
                ),
            }));
        }
        if self.ad_bonuses.contains(&0) {
            return Err(Error::new(ErrorDetails::Config {
                message: "`metering.ad_bonuses` entries must be greater than zero".to_string(),
            }));
        }
        Ok(())
    }

    pub fn max_ad_credits(&self) -> u32 {
        u32::try_from(self.ad_bonuses.len()).unwrap_or(u32::MAX)
    }

    /// Base limit plus every bonus unlocked by `ads_watched` credits.
    pub fn effective_limit(&self, ads_watched: u32) -> u32 {
        self.ad_bonuses
            .iter()
            .take(ads_watched as usize)
            .fold(self.base_daily_limit, |limit, bonus| limit.saturating_add(*bonus))
    }

    /// Capacity the next rewarded ad would unlock, zero once the schedule is exhausted.
    pub fn next_ad_bonus(&self, ads_watched: u32) -> u32 {
        self.ad_bonuses
            .get(ads_watched as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn limit_reached(&self, ads_watched: u32) -> LimitReached {
        let available_ad_bonus = self.next_ad_bonus(ads_watched);
        let message = match (ads_watched, available_ad_bonus) {
            (_, 0) => "You've reached your maximum daily limit. Upgrade to Premium for unlimited cocktails!".to_string(),
            (0, bonus) => format!(
                "You've hit your {}-drink limit for today. Watch an ad to unlock {bonus} more!",
                self.base_daily_limit
            ),
            (_, bonus) => format!(
                "You've used your bonus drinks! Watch another ad to unlock {bonus} more."
            ),
        };
        LimitReached {
            message,
            show_premium_offer: true,
            available_ad_bonus,
        }
    }
}

/// Why a request was let through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AllowReason {
    /// Unexpired premium subscription, counters bypassed
    Premium,
    WithinLimit,
    /// A rewarded ad was credited on this call
    AdCredited,
    /// Storage was unreachable, so the request was let through unmetered
    Degraded,
}

/// Remediation payload returned when a user is out of capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitReached {
    pub message: String,
    pub show_premium_offer: bool,
    pub available_ad_bonus: u32,
}

/// Permission to consume one unit. Metered admissions hold a reservation that
/// counts against the uid's capacity until the admission is recorded or dropped.
#[derive(Debug)]
pub struct Admission {
    uid: String,
    reason: AllowReason,
    reservation: Option<Reservation>,
}

impl Admission {
    fn metered(uid: &str, reason: AllowReason, reservation: Reservation) -> Self {
        Self {
            uid: uid.to_string(),
            reason,
            reservation: Some(reservation),
        }
    }

    fn unmetered(uid: &str, reason: AllowReason) -> Self {
        Self {
            uid: uid.to_string(),
            reason,
            reservation: None,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn reason(&self) -> AllowReason {
        self.reason
    }

    pub fn holds_reservation(&self) -> bool {
        self.reservation.is_some()
    }

    pub(super) fn into_parts(self) -> (String, AllowReason, Option<Reservation>) {
        (self.uid, self.reason, self.reservation)
    }
}

#[derive(Debug)]
pub enum EntitlementDecision {
    Allow(Admission),
    Deny(LimitReached),
}

impl EntitlementDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntitlementDecision::Allow(_))
    }
}

impl UsageMeter {
    /// Decides whether `uid` may consume one more suggestion.
    ///
    /// Storage failures never block the user: the request is allowed in degraded mode.
    pub async fn evaluate(&self, uid: &str, watched_ad: bool) -> EntitlementDecision {
        let guard = self.locks.acquire(uid).await;
        let decision = match self.evaluate_locked(uid, watched_ad, &guard).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    uid,
                    reason = "storage_unavailable",
                    "Entitlement check degraded, allowing request: {e}"
                );
                self.metrics.record_degraded();
                EntitlementDecision::Allow(Admission::unmetered(uid, AllowReason::Degraded))
            }
        };
        self.metrics.record_decision(&decision);
        decision
    }

    async fn evaluate_locked(
        &self,
        uid: &str,
        watched_ad: bool,
        guard: &UidGuard,
    ) -> Result<EntitlementDecision, Error> {
        let now = self.clock.now();
        let today = now.date_naive();

        let mut record = match self.store.get(uid).await? {
            Some(record) => record,
            None => {
                debug!(uid, "Creating usage record on first access");
                self.store
                    .create(uid, NewUsageRecord::for_day(today))
                    .await?
            }
        };

        // Premium precedes the daily reset
        if record.has_active_premium(now) {
            return Ok(EntitlementDecision::Allow(Admission::unmetered(
                uid,
                AllowReason::Premium,
            )));
        }

        let mut update = UsageRecordUpdate::default();
        if record.is_premium {
            info!(uid, "Premium subscription expired, resuming metering");
            update.is_premium = Some(false);
        }
        if record.needs_reset(today) {
            debug!(uid, last_reset = %record.last_reset, "Resetting daily usage window");
            update.request_count = Some(0);
            update.ads_watched = Some(0);
            update.last_reset = Some(today);
        }
        if !update.is_empty() {
            record = self.store.update(uid, update).await?;
        }

        if watched_ad && record.ads_watched < self.config.max_ad_credits() {
            let ads_watched = record.ads_watched + 1;
            record = self
                .store
                .update(
                    uid,
                    UsageRecordUpdate {
                        ads_watched: Some(ads_watched),
                        ..Default::default()
                    },
                )
                .await?;
            self.metrics.record_ad_credit();
            info!(
                uid,
                ads_watched = record.ads_watched,
                effective_limit = self.config.effective_limit(record.ads_watched),
                "Credited rewarded ad"
            );
            return Ok(EntitlementDecision::Allow(Admission::metered(
                uid,
                AllowReason::AdCredited,
                guard.reserve(),
            )));
        }

        let effective_limit = self.config.effective_limit(record.ads_watched);
        let committed = record.request_count.saturating_add(guard.in_flight());
        if committed < effective_limit {
            return Ok(EntitlementDecision::Allow(Admission::metered(
                uid,
                AllowReason::WithinLimit,
                guard.reserve(),
            )));
        }

        debug!(
            uid,
            request_count = record.request_count,
            in_flight = guard.in_flight(),
            effective_limit,
            "Usage limit reached"
        );
        if !record.show_premium_offer {
            // Advisory only, so a failed write must not turn a deny into an allow
            if let Err(e) = self
                .store
                .update(
                    uid,
                    UsageRecordUpdate {
                        show_premium_offer: Some(true),
                        ..Default::default()
                    },
                )
                .await
            {
                warn!(uid, "Failed to persist premium offer flag: {e}");
            }
        }
        Ok(EntitlementDecision::Deny(
            self.config.limit_reached(record.ads_watched),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use tracing_test::traced_test;

    use super::*;
    use crate::testing::{FailingUsageStore, TestMeter};
    use crate::usage::{Clock, UsageRecordStore};

    #[test]
    fn test_default_schedule() {
        let config = MeteringConfig::default();
        assert_eq!(config.effective_limit(0), 3);
        assert_eq!(config.effective_limit(1), 5);
        assert_eq!(config.effective_limit(2), 6);
        // Credits beyond the schedule unlock nothing
        assert_eq!(config.effective_limit(7), 6);
        assert_eq!(config.max_ad_credits(), 2);
        assert_eq!(config.next_ad_bonus(0), 2);
        assert_eq!(config.next_ad_bonus(1), 1);
        assert_eq!(config.next_ad_bonus(2), 0);
    }

    #[test]
    fn test_limit_reached_messages() {
        let config = MeteringConfig::default();
        assert_eq!(
            config.limit_reached(0),
            LimitReached {
                message: "You've hit your 3-drink limit for today. Watch an ad to unlock 2 more!"
                    .to_string(),
                show_premium_offer: true,
                available_ad_bonus: 2,
            }
        );
        assert_eq!(
            config.limit_reached(1).message,
            "You've used your bonus drinks! Watch another ad to unlock 1 more."
        );
        let exhausted = config.limit_reached(2);
        assert_eq!(
            exhausted.message,
            "You've reached your maximum daily limit. Upgrade to Premium for unlimited cocktails!"
        );
        assert_eq!(exhausted.available_ad_bonus, 0);
    }

    #[test]
    fn test_validate_rejects_bad_schedules() {
        assert!(MeteringConfig::default().validate().is_ok());
        assert!(MeteringConfig {
            base_daily_limit: 0,
            ad_bonuses: vec![2, 1],
        }
        .validate()
        .is_err());
        assert!(MeteringConfig {
            base_daily_limit: 3,
            ad_bonuses: vec![],
        }
        .validate()
        .is_err());
        assert!(MeteringConfig {
            base_daily_limit: 3,
            ad_bonuses: vec![2, 0],
        }
        .validate()
        .is_err());
        assert!(MeteringConfig {
            base_daily_limit: 3,
            ad_bonuses: vec![2, 1, 1],
        }
        .validate()
        .is_err());
    }

    #[tokio::test]
    async fn test_first_evaluation_creates_record_and_allows() {
        let t = TestMeter::new();
        let decision = t.meter.evaluate("fresh", false).await;
        match decision {
            EntitlementDecision::Allow(admission) => {
                assert_eq!(admission.reason(), AllowReason::WithinLimit);
                assert!(admission.holds_reservation());
            }
            EntitlementDecision::Deny(_) => panic!("first evaluation must allow"),
        }
        let record = t.record("fresh").await;
        assert_eq!(record.request_count, 0);
        assert_eq!(record.last_reset, t.clock.today());
    }

    #[tokio::test]
    async fn test_in_flight_admissions_count_against_limit() {
        let t = TestMeter::new();
        let mut held = Vec::new();
        for _ in 0..3 {
            match t.meter.evaluate("u1", false).await {
                EntitlementDecision::Allow(admission) => held.push(admission),
                EntitlementDecision::Deny(_) => panic!("expected capacity"),
            }
        }
        // Nothing recorded yet, but all three units are reserved
        assert!(!t.meter.evaluate("u1", false).await.is_allowed());

        // Abandoning one frees its unit without charging
        drop(held.pop());
        assert!(t.meter.evaluate("u1", false).await.is_allowed());
        assert_eq!(t.record("u1").await.request_count, 0);
    }

    #[tokio::test]
    async fn test_deny_persists_premium_offer_flag() {
        let t = TestMeter::new();
        t.set_count("u1", 3).await;
        assert!(!t.record("u1").await.show_premium_offer);

        match t.meter.evaluate("u1", false).await {
            EntitlementDecision::Deny(limit) => assert_eq!(limit.available_ad_bonus, 2),
            EntitlementDecision::Allow(_) => panic!("expected deny"),
        }
        assert!(t.record("u1").await.show_premium_offer);
    }

    #[tokio::test]
    async fn test_ad_credit_bypasses_count_check() {
        let t = TestMeter::new();
        t.set_count("u1", 3).await;

        match t.meter.evaluate("u1", true).await {
            EntitlementDecision::Allow(admission) => {
                assert_eq!(admission.reason(), AllowReason::AdCredited);
            }
            EntitlementDecision::Deny(_) => panic!("ad credit must allow"),
        }
        assert_eq!(t.record("u1").await.ads_watched, 1);
    }

    #[tokio::test]
    async fn test_ads_watched_is_capped() {
        let t = TestMeter::new();
        for _ in 0..5 {
            if let EntitlementDecision::Allow(admission) = t.meter.evaluate("u1", true).await {
                t.meter.record_consumption(admission).await;
            }
        }
        let record = t.record("u1").await;
        assert_eq!(record.ads_watched, 2);
    }

    #[tokio::test]
    async fn test_rollover_resets_once() {
        let t = TestMeter::new();
        t.set_count("u1", 3).await;
        assert!(!t.meter.evaluate("u1", false).await.is_allowed());

        t.clock.advance(Duration::days(1));
        let first = t.meter.evaluate("u1", false).await;
        assert!(first.is_allowed());
        if let EntitlementDecision::Allow(admission) = first {
            t.meter.record_consumption(admission).await;
        }

        // The second evaluation on the new day must not reset again
        assert!(t.meter.evaluate("u1", false).await.is_allowed());
        let record = t.record("u1").await;
        assert_eq!(record.request_count, 1);
        assert_eq!(record.last_reset, t.clock.today());
    }

    #[tokio::test]
    async fn test_expired_premium_is_downgraded() {
        let t = TestMeter::new();
        t.set_count("u1", 3).await;
        let now = t.clock.now();
        t.store
            .update(
                "u1",
                UsageRecordUpdate {
                    is_premium: Some(true),
                    premium_expiry: Some(Some(now - Duration::minutes(1))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!t.meter.evaluate("u1", false).await.is_allowed());
        assert!(!t.record("u1").await.is_premium);
    }

    #[tokio::test]
    async fn test_premium_precedes_reset() {
        let t = TestMeter::new();
        t.set_count("u1", 3).await;
        let now = t.clock.now();
        t.store
            .update(
                "u1",
                UsageRecordUpdate {
                    is_premium: Some(true),
                    premium_expiry: Some(Some(now + Duration::days(30))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        t.clock.advance(Duration::days(2));
        match t.meter.evaluate("u1", false).await {
            EntitlementDecision::Allow(admission) => {
                assert_eq!(admission.reason(), AllowReason::Premium);
                assert!(!admission.holds_reservation());
            }
            EntitlementDecision::Deny(_) => panic!("premium must allow"),
        }
        // Untouched: the bypass happens before the reset
        assert_eq!(t.record("u1").await.request_count, 3);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_storage_failure_fails_open() {
        let clock = Arc::new(crate::usage::ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap(),
        ));
        let meter = UsageMeter::new(
            Arc::new(FailingUsageStore),
            MeteringConfig::default(),
            Default::default(),
        )
        .with_clock(clock);

        match meter.evaluate("u1", false).await {
            EntitlementDecision::Allow(admission) => {
                assert_eq!(admission.reason(), AllowReason::Degraded);
                assert!(!admission.holds_reservation());
            }
            EntitlementDecision::Deny(_) => panic!("storage failure must fail open"),
        }
        assert!(logs_contain("Entitlement check degraded"));
        assert_eq!(meter.metrics().degraded(), 1);
    }
}
