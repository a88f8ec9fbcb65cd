use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::record::{NewUsageRecord, UsageRecord, UsageRecordUpdate};
use super::store::UsageRecordStore;
use crate::error::{Error, ErrorDetails};

const USAGE_RECORD_KEY_PREFIX: &str = "usage_record:";
const BACKEND_NAME: &str = "redis";

const FIELD_UID: &str = "uid";
const FIELD_REQUEST_COUNT: &str = "request_count";
const FIELD_LAST_RESET: &str = "last_reset";
const FIELD_ADS_WATCHED: &str = "ads_watched";
const FIELD_IS_PREMIUM: &str = "is_premium";
const FIELD_PREMIUM_EXPIRY: &str = "premium_expiry";
const FIELD_SHOW_PREMIUM_OFFER: &str = "show_premium_offer";

/// Usage records stored as one Redis hash per uid.
///
/// `create` and `update` run as Lua scripts so each call is atomic on the server.
pub struct RedisUsageStore {
    conn: MultiplexedConnection,
    timeout: Duration,
    create_script: Script,
    update_script: Script,
}

impl RedisUsageStore {
    pub async fn new(url: &str, timeout: Duration) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to create Redis client: {e}"),
            })
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::AppState {
                    message: format!("Failed to get Redis connection: {e}"),
                })
            })?;

        let create_script = Script::new(
            r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                redis.call('HSET', KEYS[1], unpack(ARGV))
            end
            return redis.call('HGETALL', KEYS[1])
            "#,
        );

        // Returns nil when the record does not exist so the caller can report NotFound
        let update_script = Script::new(
            r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return false
            end
            redis.call('HSET', KEYS[1], unpack(ARGV))
            return redis.call('HGETALL', KEYS[1])
            "#,
        );

        debug!("Connected usage record store to Redis");
        Ok(Self {
            conn,
            timeout,
            create_script,
            update_script,
        })
    }

    fn key(uid: &str) -> String {
        format!("{USAGE_RECORD_KEY_PREFIX}{uid}")
    }

    async fn with_timeout<T, F>(&self, uid: &str, op: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(uid, "Redis error during usage record {op}: {e}");
                Err(Error::new(ErrorDetails::StorageUnavailable {
                    backend: BACKEND_NAME.to_string(),
                    message: e.to_string(),
                }))
            }
            Err(_) => {
                warn!(
                    uid,
                    "Redis timeout during usage record {op} after {}ms",
                    self.timeout.as_millis()
                );
                Err(Error::new(ErrorDetails::StorageUnavailable {
                    backend: BACKEND_NAME.to_string(),
                    message: format!("timed out after {}ms", self.timeout.as_millis()),
                }))
            }
        }
    }
}

#[async_trait]
impl UsageRecordStore for RedisUsageStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get(&self, uid: &str) -> Result<Option<UsageRecord>, Error> {
        let mut conn = self.conn.clone();
        let key = Self::key(uid);
        let fields: HashMap<String, String> = self
            .with_timeout(uid, "get", conn.hgetall(&key))
            .await?;
        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(uid, &fields).map(Some)
    }

    async fn create(&self, uid: &str, defaults: NewUsageRecord) -> Result<UsageRecord, Error> {
        let mut conn = self.conn.clone();
        let record = defaults.into_record(uid);
        let mut invocation = self.create_script.key(Self::key(uid));
        for (field, value) in record_to_fields(&record) {
            invocation.arg(field).arg(value);
        }
        let fields: HashMap<String, String> = self
            .with_timeout(uid, "create", invocation.invoke_async(&mut conn))
            .await?;
        record_from_fields(uid, &fields)
    }

    async fn update(&self, uid: &str, update: UsageRecordUpdate) -> Result<UsageRecord, Error> {
        if update.is_empty() {
            return self.get(uid).await?.ok_or_else(|| {
                Error::new_without_logging(ErrorDetails::UsageRecordNotFound {
                    uid: uid.to_string(),
                })
            });
        }

        let mut conn = self.conn.clone();
        let mut invocation = self.update_script.key(Self::key(uid));
        for (field, value) in update_to_fields(&update) {
            invocation.arg(field).arg(value);
        }
        let fields: Option<HashMap<String, String>> = self
            .with_timeout(uid, "update", invocation.invoke_async(&mut conn))
            .await?;
        match fields {
            Some(fields) => record_from_fields(uid, &fields),
            None => Err(Error::new_without_logging(
                ErrorDetails::UsageRecordNotFound {
                    uid: uid.to_string(),
                },
            )),
        }
    }
}

fn encode_expiry(expiry: Option<DateTime<Utc>>) -> String {
    expiry.map(|e| e.to_rfc3339()).unwrap_or_default()
}

fn encode_bool(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn record_to_fields(record: &UsageRecord) -> Vec<(&'static str, String)> {
    vec![
        (FIELD_UID, record.uid.clone()),
        (FIELD_REQUEST_COUNT, record.request_count.to_string()),
        (FIELD_LAST_RESET, record.last_reset.to_string()),
        (FIELD_ADS_WATCHED, record.ads_watched.to_string()),
        (FIELD_IS_PREMIUM, encode_bool(record.is_premium)),
        (FIELD_PREMIUM_EXPIRY, encode_expiry(record.premium_expiry)),
        (FIELD_SHOW_PREMIUM_OFFER, encode_bool(record.show_premium_offer)),
    ]
}

fn update_to_fields(update: &UsageRecordUpdate) -> Vec<(&'static str, String)> {
    let mut fields = Vec::new();
    if let Some(request_count) = update.request_count {
        fields.push((FIELD_REQUEST_COUNT, request_count.to_string()));
    }
    if let Some(last_reset) = update.last_reset {
        fields.push((FIELD_LAST_RESET, last_reset.to_string()));
    }
    if let Some(ads_watched) = update.ads_watched {
        fields.push((FIELD_ADS_WATCHED, ads_watched.to_string()));
    }
    if let Some(is_premium) = update.is_premium {
        fields.push((FIELD_IS_PREMIUM, encode_bool(is_premium)));
    }
    if let Some(premium_expiry) = update.premium_expiry {
        fields.push((FIELD_PREMIUM_EXPIRY, encode_expiry(premium_expiry)));
    }
    if let Some(show_premium_offer) = update.show_premium_offer {
        fields.push((FIELD_SHOW_PREMIUM_OFFER, encode_bool(show_premium_offer)));
    }
    fields
}

fn record_from_fields(uid: &str, fields: &HashMap<String, String>) -> Result<UsageRecord, Error> {
    let field = |name: &str| -> Result<&str, Error> {
        fields.get(name).map(String::as_str).ok_or_else(|| {
            Error::new(ErrorDetails::Serialization {
                message: format!("Usage record `{uid}` is missing field `{name}`"),
            })
        })
    };
    let malformed = |name: &str, e: &dyn std::fmt::Display| {
        Error::new(ErrorDetails::Serialization {
            message: format!("Usage record `{uid}` has malformed field `{name}`: {e}"),
        })
    };

    let request_count = field(FIELD_REQUEST_COUNT)?
        .parse::<u32>()
        .map_err(|e| malformed(FIELD_REQUEST_COUNT, &e))?;
    let last_reset = field(FIELD_LAST_RESET)?
        .parse::<NaiveDate>()
        .map_err(|e| malformed(FIELD_LAST_RESET, &e))?;
    let ads_watched = field(FIELD_ADS_WATCHED)?
        .parse::<u32>()
        .map_err(|e| malformed(FIELD_ADS_WATCHED, &e))?;
    let premium_expiry = match field(FIELD_PREMIUM_EXPIRY)? {
        "" => None,
        raw => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| malformed(FIELD_PREMIUM_EXPIRY, &e))?
                .with_timezone(&Utc),
        ),
    };

    Ok(UsageRecord {
        uid: uid.to_string(),
        request_count,
        last_reset,
        ads_watched,
        is_premium: field(FIELD_IS_PREMIUM)? == "1",
        premium_expiry,
        show_premium_offer: field(FIELD_SHOW_PREMIUM_OFFER)? == "1",
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn as_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_record_fields_survive_hash_encoding() {
        let mut record = NewUsageRecord::for_day(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap())
            .into_record("u-42");
        record.request_count = 4;
        record.ads_watched = 1;
        record.is_premium = true;
        record.premium_expiry = Some(Utc.with_ymd_and_hms(2026, 2, 3, 10, 0, 0).unwrap());

        let decoded = record_from_fields("u-42", &as_map(record_to_fields(&record))).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_empty_expiry_decodes_as_none() {
        let record = NewUsageRecord::for_day(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap())
            .into_record("u-1");
        let fields = as_map(record_to_fields(&record));
        assert_eq!(fields[FIELD_PREMIUM_EXPIRY], "");
        assert_eq!(fields[FIELD_IS_PREMIUM], "0");
        assert!(record_from_fields("u-1", &fields)
            .unwrap()
            .premium_expiry
            .is_none());
    }

    #[test]
    fn test_update_only_encodes_set_fields() {
        let update = UsageRecordUpdate {
            request_count: Some(3),
            premium_expiry: Some(None),
            ..Default::default()
        };
        let fields = update_to_fields(&update);
        assert_eq!(
            fields,
            vec![
                (FIELD_REQUEST_COUNT, "3".to_string()),
                (FIELD_PREMIUM_EXPIRY, String::new()),
            ]
        );
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        let mut fields = as_map(record_to_fields(
            &NewUsageRecord::for_day(NaiveDate::from_ymd_opt(2025, 2, 3).unwrap())
                .into_record("u-1"),
        ));
        fields.insert(FIELD_REQUEST_COUNT.to_string(), "many".to_string());
        let err = record_from_fields("u-1", &fields).unwrap_err();
        assert!(err.to_string().contains("request_count"));

        fields.remove(FIELD_LAST_RESET);
        assert!(record_from_fields("u-1", &fields).is_err());
    }
}
