use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use mixly_internal::config_parser::REDIS_URL_ENV_VAR;
use mixly_internal::error::ErrorDetails;
use mixly_internal::usage::{
    EntitlementDecision, ManualClock, MeteringConfig, NewUsageRecord, PremiumConfig,
    RedisUsageStore, UsageMeter, UsageRecordStore, UsageRecordUpdate,
};
use uuid::Uuid;

async fn redis_store() -> RedisUsageStore {
    let url =
        std::env::var(REDIS_URL_ENV_VAR).unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    RedisUsageStore::new(&url, Duration::from_secs(2))
        .await
        .unwrap()
}

/// Fresh uid per test so runs never see each other's records.
fn unique_uid(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::now_v7())
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
}

#[tokio::test]
async fn test_redis_create_is_insert_if_absent() {
    let store = redis_store().await;
    let uid = unique_uid("create-twice");

    let created = store.create(&uid, NewUsageRecord::for_day(day(5))).await.unwrap();
    assert_eq!(created, NewUsageRecord::for_day(day(5)).into_record(&uid));

    store
        .update(
            &uid,
            UsageRecordUpdate {
                request_count: Some(2),
                ads_watched: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // A second create with other defaults must hand back the stored record unchanged
    let again = store.create(&uid, NewUsageRecord::for_day(day(6))).await.unwrap();
    assert_eq!(again.request_count, 2);
    assert_eq!(again.ads_watched, 1);
    assert_eq!(again.last_reset, day(5));
    assert_eq!(store.get(&uid).await.unwrap(), Some(again));
}

#[tokio::test]
async fn test_redis_update_on_missing_record_is_not_found() {
    let store = redis_store().await;
    let uid = unique_uid("missing");

    assert_eq!(store.get(&uid).await.unwrap(), None);

    let err = store
        .update(
            &uid,
            UsageRecordUpdate {
                request_count: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.get_details(),
        &ErrorDetails::UsageRecordNotFound { uid: uid.clone() }
    );

    let err = store
        .update(&uid, UsageRecordUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err.get_details(),
        ErrorDetails::UsageRecordNotFound { .. }
    ));

    // The failed update must not have created the key
    assert_eq!(store.get(&uid).await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_premium_expiry_set_and_clear() {
    let store = redis_store().await;
    let uid = unique_uid("expiry");
    store.create(&uid, NewUsageRecord::for_day(day(5))).await.unwrap();

    let expiry = Utc.with_ymd_and_hms(2026, 5, 5, 9, 30, 15).unwrap();
    let record = store
        .update(
            &uid,
            UsageRecordUpdate {
                is_premium: Some(true),
                premium_expiry: Some(Some(expiry)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(record.premium_expiry, Some(expiry));

    let record = store
        .update(
            &uid,
            UsageRecordUpdate {
                premium_expiry: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(record.premium_expiry, None);
    assert!(record.is_premium);

    let stored = store.get(&uid).await.unwrap().unwrap();
    assert_eq!(stored.premium_expiry, None);
    assert!(stored.is_premium);
}

#[tokio::test]
async fn test_redis_backed_meter_charges_and_denies() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(redis_store().await);
    let meter = UsageMeter::new(
        store.clone(),
        MeteringConfig::default(),
        PremiumConfig::default(),
    )
    .with_clock(clock);
    let uid = unique_uid("meter");

    for _ in 0..3 {
        match meter.evaluate(&uid, false).await {
            EntitlementDecision::Allow(admission) => meter.record_consumption(admission).await,
            EntitlementDecision::Deny(limit) => panic!("denied too early: {limit:?}"),
        }
    }
    assert!(!meter.evaluate(&uid, false).await.is_allowed());

    let record = store.get(&uid).await.unwrap().unwrap();
    assert_eq!(record.request_count, 3);
    assert!(record.show_premium_offer);
    assert_eq!(meter.metrics().degraded(), 0);
}
