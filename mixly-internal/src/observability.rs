use clap::ValueEnum;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::error::{Error, ErrorDetails};

const DEFAULT_LOG_FILTER: &str = "gateway=debug,mixly_internal=debug,warn";
const DEBUG_LOG_FILTER: &str = "gateway=debug,mixly_internal=trace,tower_http=debug,warn";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Handle for turning on debug logs once the config file has been read.
pub struct DelayedDebugLogs {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl DelayedDebugLogs {
    pub fn enable_debug(&self) -> Result<(), Error> {
        self.handle
            .reload(EnvFilter::new(DEBUG_LOG_FILTER))
            .map_err(|e| {
                Error::new(ErrorDetails::Config {
                    message: format!("Failed to enable debug logs: {e}"),
                })
            })?;
        tracing::debug!("Debug logging enabled");
        Ok(())
    }
}

pub struct DelayedLogConfig {
    pub delayed_debug_logs: DelayedDebugLogs,
}

/// Installs the global `tracing` subscriber. Honors `RUST_LOG`, otherwise uses a
/// filter that logs this crate and the gateway binary at debug level.
pub fn setup_observability(log_format: LogFormat) -> Result<DelayedLogConfig, Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter, handle) = reload::Layer::new(filter);

    let json_layer = (log_format == LogFormat::Json).then(|| fmt::layer().json());
    let pretty_layer = (log_format == LogFormat::Pretty).then(fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| {
            Error::new(ErrorDetails::Config {
                message: format!("Failed to initialize tracing subscriber: {e}"),
            })
        })?;

    Ok(DelayedLogConfig {
        delayed_debug_logs: DelayedDebugLogs { handle },
    })
}

/// Installs the global Prometheus recorder backing the `/metrics` route.
pub fn setup_metrics() -> Result<PrometheusHandle, Error> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        Error::new(ErrorDetails::AppState {
            message: format!("Failed to install Prometheus exporter: {e}"),
        })
    })?;

    metrics::describe_counter!(
        "mixly_entitlement_decisions",
        "Entitlement decisions by outcome and reason"
    );
    metrics::describe_counter!(
        "mixly_degraded_mode_events",
        "Entitlement checks allowed because usage storage was unavailable"
    );
    metrics::describe_counter!("mixly_ad_credits", "Rewarded ads credited");
    metrics::describe_counter!(
        "mixly_consumption_recorded",
        "Suggestions charged against a usage record"
    );
    metrics::describe_counter!(
        "mixly_consumption_skipped",
        "Suggestions that could not be charged"
    );
    metrics::describe_counter!("mixly_premium_grants", "Premium subscriptions granted");
    metrics::describe_counter!("request_count", "HTTP requests by endpoint");

    Ok(handle)
}
