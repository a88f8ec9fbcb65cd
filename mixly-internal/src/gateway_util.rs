use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{rejection::JsonRejection, FromRequest, Json, Request};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::config_parser::{Config, StorageConfig, REDIS_URL_ENV_VAR};
use crate::error::{Error, ErrorDetails, FieldViolation};
use crate::suggestion::SuggestionProvider;
use crate::usage::{InMemoryUsageStore, RedisUsageStore, UsageMeter, UsageRecordStore};

/// State for the API
#[derive(Clone)]
pub struct AppStateData {
    pub config: Arc<Config>,
    pub http_client: Client,
    pub usage_meter: Arc<UsageMeter>,
    pub suggestion_provider: Arc<dyn SuggestionProvider>,
}
pub type AppState = axum::extract::State<AppStateData>;

impl AppStateData {
    pub async fn new(config: Arc<Config>) -> Result<Self, Error> {
        let http_client = setup_http_client()?;
        let store = setup_usage_store(&config.storage).await?;
        let usage_meter = Arc::new(UsageMeter::new(
            store,
            config.metering.clone(),
            config.premium.clone(),
        ));
        let suggestion_provider = config.suggestion_provider.load()?;
        Ok(Self::new_with_parts(
            config,
            http_client,
            usage_meter,
            suggestion_provider,
        ))
    }

    pub fn new_with_parts(
        config: Arc<Config>,
        http_client: Client,
        usage_meter: Arc<UsageMeter>,
        suggestion_provider: Arc<dyn SuggestionProvider>,
    ) -> Self {
        Self {
            config,
            http_client,
            usage_meter,
            suggestion_provider,
        }
    }
}

/// Builds the usage record store once at startup. The same store backs
/// entitlement checks, accounting and premium upgrades.
pub async fn setup_usage_store(
    storage: &StorageConfig,
) -> Result<Arc<dyn UsageRecordStore>, Error> {
    match storage {
        StorageConfig::Memory => {
            tracing::warn!(
                "Usage records are kept in memory and will be lost on restart. Set `[storage] type = \"redis\"` to persist them."
            );
            Ok(Arc::new(InMemoryUsageStore::new()))
        }
        StorageConfig::Redis { url, timeout_ms } => {
            let url = match url {
                Some(url) => url.clone(),
                None => std::env::var(REDIS_URL_ENV_VAR).map_err(|_| {
                    Error::new(ErrorDetails::Config {
                        message: format!(
                            "`storage.url` is not set and environment variable `{REDIS_URL_ENV_VAR}` is missing"
                        ),
                    })
                })?,
            };
            let store = RedisUsageStore::new(&url, Duration::from_millis(*timeout_ms)).await?;
            tracing::info!("Usage records are stored in Redis");
            Ok(Arc::new(store))
        }
    }
}

/// Periodically drops per-user lock slots that nobody is using.
pub fn start_lock_pruning(usage_meter: Arc<UsageMeter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = usage_meter.prune_idle_locks();
            if pruned > 0 {
                tracing::trace!("Pruned {pruned} idle usage lock slots");
            }
        }
    })
}

/// Custom Axum extractor that validates the JSON body and deserializes it into a custom type
///
/// When this extractor is present, we don't check if the `Content-Type` header is `application/json`,
/// and instead simply assume that the request body is a JSON object.
pub struct StructuredJson<T>(pub T);

impl<S, T> FromRequest<S> for StructuredJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
    T: Send + Sync + DeserializeOwned,
{
    type Rejection = Error;

    #[instrument(skip_all, level = "trace", name = "StructuredJson::from_request")]
    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        // Retrieve the request body as Bytes before deserializing it
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            Error::new(ErrorDetails::JsonRequest {
                message: format!("{} ({})", e, e.status()),
            })
        })?;

        // Convert the entire body into `serde_json::Value`
        let value = Json::<serde_json::Value>::from_bytes(&bytes)
            .map_err(|e| {
                Error::new(ErrorDetails::JsonRequest {
                    message: format!("{} ({})", e, e.status()),
                })
            })?
            .0;

        // Shape errors carry the path of the offending field
        let deserialized: T = serde_path_to_error::deserialize(&value).map_err(|e| {
            let field = match e.path().to_string() {
                path if path == "." => "body".to_string(),
                path => path,
            };
            Error::new(ErrorDetails::Validation {
                violations: vec![FieldViolation::new(field, e.into_inner().to_string())],
            })
        })?;

        Ok(StructuredJson(deserialized))
    }
}

pub const DEFAULT_HTTP_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

pub fn setup_http_client() -> Result<Client, Error> {
    Client::builder()
        .timeout(DEFAULT_HTTP_CLIENT_TIMEOUT)
        .build()
        .map_err(|e| {
            Error::new(ErrorDetails::AppState {
                message: format!("Failed to build HTTP client: {e}"),
            })
        })
}
