use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// Version of the HTTP API, independent of the gateway build version.
pub const MIXLY_API_VERSION: &str = "1.0.0";
pub const MIXLY_API_NAME: &str = "Mixly API";
pub const MIXLY_GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handler for a simple liveness check
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

pub async fn version_handler() -> Json<Value> {
    Json(json!({
        "version": MIXLY_API_VERSION,
        "name": MIXLY_API_NAME,
    }))
}
