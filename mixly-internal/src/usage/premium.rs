use chrono::{DateTime, Months, Utc};
use serde::Deserialize;
use tracing::info;

use super::record::{NewUsageRecord, UsageRecordUpdate};
use super::UsageMeter;
use crate::error::{Error, ErrorDetails};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct PremiumConfig {
    /// How long one successful upgrade lasts, counted from the upgrade
    pub duration_months: u32,
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self {
            duration_months: 12,
        }
    }
}

impl PremiumConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.duration_months == 0 {
            return Err(Error::new(ErrorDetails::Config {
                message: "`premium.duration_months` must be greater than zero".to_string(),
            }));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PremiumGrant {
    pub uid: String,
    pub premium_expiry: DateTime<Utc>,
}

impl UsageMeter {
    /// Moves `uid` to premium until `now + duration`. Calling it again re-extends from now.
    ///
    /// Unlike the entitlement check, storage failures are surfaced so a paid upgrade
    /// is never silently lost.
    pub async fn grant_premium(
        &self,
        uid: &str,
        payment_confirmed: bool,
    ) -> Result<PremiumGrant, Error> {
        if !payment_confirmed {
            return Err(Error::new(ErrorDetails::PaymentNotCompleted {
                uid: uid.to_string(),
            }));
        }

        let _guard = self.locks.acquire(uid).await;
        let now = self.clock.now();
        let premium_expiry = now
            .checked_add_months(Months::new(self.premium.duration_months))
            .ok_or_else(|| {
                Error::new(ErrorDetails::InternalError {
                    message: format!(
                        "Premium expiry overflowed adding {} months to {now}",
                        self.premium.duration_months
                    ),
                })
            })?;

        if self.store.get(uid).await?.is_none() {
            self.store
                .create(uid, NewUsageRecord::for_day(now.date_naive()))
                .await?;
        }
        let record = self
            .store
            .update(
                uid,
                UsageRecordUpdate {
                    is_premium: Some(true),
                    premium_expiry: Some(Some(premium_expiry)),
                    show_premium_offer: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                if let ErrorDetails::UsageRecordNotFound { .. } = e.get_details() {
                    // Logged here since the store does not log missing records
                    e.log();
                }
                e
            })?;

        info!(uid, premium_expiry = %premium_expiry, "Granted premium subscription");
        self.metrics.record_premium_grant();
        Ok(PremiumGrant {
            uid: record.uid,
            premium_expiry,
        })
    }
}
