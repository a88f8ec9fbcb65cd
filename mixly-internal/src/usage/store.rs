use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::record::{NewUsageRecord, UsageRecord, UsageRecordUpdate};
use crate::error::{Error, ErrorDetails};

/// Key-value persistence for usage records, keyed by uid.
///
/// Implementations must make `create` insert-if-absent and `update` atomic per call.
/// Callers serialize read-modify-write sequences for a uid themselves.
#[async_trait]
pub trait UsageRecordStore: Send + Sync {
    /// Short name used in logs and errors
    fn backend_name(&self) -> &'static str;

    async fn get(&self, uid: &str) -> Result<Option<UsageRecord>, Error>;

    /// Creates the record with `defaults`, or returns the existing one untouched.
    async fn create(&self, uid: &str, defaults: NewUsageRecord) -> Result<UsageRecord, Error>;

    /// Applies `update` and returns the stored record.
    /// Fails with `UsageRecordNotFound` when the uid has no record.
    async fn update(&self, uid: &str, update: UsageRecordUpdate) -> Result<UsageRecord, Error>;
}

#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: DashMap<String, UsageRecord>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl UsageRecordStore for InMemoryUsageStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, uid: &str) -> Result<Option<UsageRecord>, Error> {
        Ok(self.records.get(uid).map(|r| r.value().clone()))
    }

    async fn create(&self, uid: &str, defaults: NewUsageRecord) -> Result<UsageRecord, Error> {
        let record = match self.records.entry(uid.to_string()) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(vacant) => vacant.insert(defaults.into_record(uid)).value().clone(),
        };
        Ok(record)
    }

    async fn update(&self, uid: &str, update: UsageRecordUpdate) -> Result<UsageRecord, Error> {
        match self.records.get_mut(uid) {
            Some(mut record) => {
                update.apply(record.value_mut());
                Ok(record.value().clone())
            }
            None => Err(Error::new_without_logging(
                ErrorDetails::UsageRecordNotFound {
                    uid: uid.to_string(),
                },
            )),
        }
    }
}
