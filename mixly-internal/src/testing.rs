#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::config_parser::Config;
use crate::error::{Error, ErrorDetails};
use crate::gateway_util::AppStateData;
use crate::suggestion::{Suggestion, SuggestionProvider};
use crate::usage::{
    Clock, InMemoryUsageStore, ManualClock, MeteringConfig, NewUsageRecord, PremiumConfig, UsageMeter,
    UsageRecord, UsageRecordStore, UsageRecordUpdate,
};

/// A meter over an in-memory store with a manual clock set to 2025-05-05 09:00 UTC.
pub struct TestMeter {
    pub meter: Arc<UsageMeter>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryUsageStore>,
}

impl TestMeter {
    pub fn new() -> Self {
        Self::with_config(MeteringConfig::default())
    }

    pub fn with_config(config: MeteringConfig) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 5, 9, 0, 0).unwrap(),
        ));
        let store = Arc::new(InMemoryUsageStore::new());
        let meter = UsageMeter::new(store.clone(), config, PremiumConfig::default())
            .with_clock(clock.clone());
        Self {
            meter: Arc::new(meter),
            clock,
            store,
        }
    }

    pub async fn record(&self, uid: &str) -> UsageRecord {
        self.store.get(uid).await.unwrap().unwrap()
    }

    pub async fn set_count(&self, uid: &str, request_count: u32) {
        self.store
            .create(uid, NewUsageRecord::for_day(self.clock.today()))
            .await
            .unwrap();
        self.store
            .update(
                uid,
                UsageRecordUpdate {
                    request_count: Some(request_count),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
}

fn unavailable() -> Error {
    Error::new(ErrorDetails::StorageUnavailable {
        backend: "failing".to_string(),
        message: "connection refused".to_string(),
    })
}

/// Every call fails as if the backend were down.
pub struct FailingUsageStore;

#[async_trait]
impl UsageRecordStore for FailingUsageStore {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn get(&self, _uid: &str) -> Result<Option<UsageRecord>, Error> {
        Err(unavailable())
    }

    async fn create(&self, _uid: &str, _defaults: NewUsageRecord) -> Result<UsageRecord, Error> {
        Err(unavailable())
    }

    async fn update(&self, _uid: &str, _update: UsageRecordUpdate) -> Result<UsageRecord, Error> {
        Err(unavailable())
    }
}

/// Reads and creates work, updates fail.
#[derive(Default)]
pub struct UpdateFailingStore {
    inner: InMemoryUsageStore,
}

#[async_trait]
impl UsageRecordStore for UpdateFailingStore {
    fn backend_name(&self) -> &'static str {
        "update_failing"
    }

    async fn get(&self, uid: &str) -> Result<Option<UsageRecord>, Error> {
        self.inner.get(uid).await
    }

    async fn create(&self, uid: &str, defaults: NewUsageRecord) -> Result<UsageRecord, Error> {
        self.inner.create(uid, defaults).await
    }

    async fn update(&self, _uid: &str, _update: UsageRecordUpdate) -> Result<UsageRecord, Error> {
        Err(unavailable())
    }
}

/// Returns a fixed suggestion, or fails when built with `failing()`. Counts calls.
#[derive(Default)]
pub struct ScriptedProvider {
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SuggestionProvider for ScriptedProvider {
    fn provider_type(&self) -> &'static str {
        "scripted"
    }

    async fn suggest(
        &self,
        _http_client: &reqwest::Client,
        mood: &str,
        liquor: &str,
    ) -> Result<Suggestion, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::new(ErrorDetails::ProviderFailure {
                provider_type: "scripted".to_string(),
                message: "upstream unavailable".to_string(),
                status_code: None,
            }));
        }
        Ok(Suggestion {
            drink_name: format!("{liquor} {mood} Sour"),
            description: "Bright and balanced.".to_string(),
            ingredients: vec![
                "2 oz Bourbon".to_string(),
                "3/4 oz lemon juice".to_string(),
                "1/2 oz simple syrup".to_string(),
                "Cocktail shaker".to_string(),
            ],
            garnish: "Lemon twist".to_string(),
            emoji: "🍋".to_string(),
        })
    }
}

pub fn get_unit_test_app_state_data(
    meter: Arc<UsageMeter>,
    provider: Arc<dyn SuggestionProvider>,
) -> AppStateData {
    AppStateData::new_with_parts(
        Arc::new(Config::default()),
        reqwest::Client::new(),
        meter,
        provider,
    )
}
