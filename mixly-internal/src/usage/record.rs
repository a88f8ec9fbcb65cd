use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-user metering counters. One record exists per uid and is never deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub uid: String,
    /// Units consumed since `last_reset`
    pub request_count: u32,
    /// Start of the current metering window (UTC calendar date)
    pub last_reset: NaiveDate,
    /// Reward grants applied in the current window
    pub ads_watched: u32,
    pub is_premium: bool,
    pub premium_expiry: Option<DateTime<Utc>>,
    pub show_premium_offer: bool,
}

impl UsageRecord {
    /// Premium only counts while the expiry is strictly in the future.
    pub fn has_active_premium(&self, now: DateTime<Utc>) -> bool {
        self.is_premium && self.premium_expiry.is_some_and(|expiry| expiry > now)
    }

    pub fn needs_reset(&self, today: NaiveDate) -> bool {
        self.last_reset != today
    }
}

/// Defaults used when a record is created lazily on first access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUsageRecord {
    pub last_reset: NaiveDate,
}

impl NewUsageRecord {
    pub fn for_day(today: NaiveDate) -> Self {
        Self { last_reset: today }
    }

    pub fn into_record(self, uid: &str) -> UsageRecord {
        UsageRecord {
            uid: uid.to_string(),
            request_count: 0,
            last_reset: self.last_reset,
            ads_watched: 0,
            is_premium: false,
            premium_expiry: None,
            show_premium_offer: false,
        }
    }
}

/// A partial update. Fields left as `None` are untouched.
///
/// `premium_expiry` is doubly optional: `Some(None)` clears the expiry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UsageRecordUpdate {
    pub request_count: Option<u32>,
    pub last_reset: Option<NaiveDate>,
    pub ads_watched: Option<u32>,
    pub is_premium: Option<bool>,
    pub premium_expiry: Option<Option<DateTime<Utc>>>,
    pub show_premium_offer: Option<bool>,
}

impl UsageRecordUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, record: &mut UsageRecord) {
        if let Some(request_count) = self.request_count {
            record.request_count = request_count;
        }
        if let Some(last_reset) = self.last_reset {
            record.last_reset = last_reset;
        }
        if let Some(ads_watched) = self.ads_watched {
            record.ads_watched = ads_watched;
        }
        if let Some(is_premium) = self.is_premium {
            record.is_premium = is_premium;
        }
        if let Some(premium_expiry) = self.premium_expiry {
            record.premium_expiry = premium_expiry;
        }
        if let Some(show_premium_offer) = self.show_premium_offer {
            record.show_premium_offer = show_premium_offer;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let record = NewUsageRecord::for_day(today).into_record("abc");
        assert_eq!(record.uid, "abc");
        assert_eq!(record.request_count, 0);
        assert_eq!(record.ads_watched, 0);
        assert_eq!(record.last_reset, today);
        assert!(!record.is_premium);
        assert!(record.premium_expiry.is_none());
        assert!(!record.show_premium_offer);
    }

    #[test]
    fn test_active_premium_requires_future_expiry() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut record = NewUsageRecord::for_day(now.date_naive()).into_record("abc");

        record.is_premium = true;
        assert!(!record.has_active_premium(now));

        record.premium_expiry = Some(now);
        assert!(!record.has_active_premium(now));

        record.premium_expiry = Some(now + Duration::seconds(1));
        assert!(record.has_active_premium(now));

        record.is_premium = false;
        assert!(!record.has_active_premium(now));
    }

    #[test]
    fn test_partial_update_only_touches_set_fields() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let mut record = NewUsageRecord::for_day(today).into_record("abc");
        record.request_count = 2;
        record.premium_expiry = Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        let update = UsageRecordUpdate {
            ads_watched: Some(1),
            premium_expiry: Some(None),
            ..Default::default()
        };
        assert!(!update.is_empty());
        update.apply(&mut record);

        assert_eq!(record.request_count, 2);
        assert_eq!(record.ads_watched, 1);
        assert!(record.premium_expiry.is_none());
        assert!(UsageRecordUpdate::default().is_empty());
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let record = NewUsageRecord::for_day(today).into_record("abc");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["requestCount"], 0);
        assert_eq!(json["lastReset"], "2025-01-02");
        assert_eq!(json["showPremiumOffer"], false);
    }
}
