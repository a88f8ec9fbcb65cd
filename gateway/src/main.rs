use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use mimalloc::MiMalloc;
use std::fmt::Display;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnFailure, TraceLayer};
use tracing::Level;

use mixly_internal::config_parser::Config;
use mixly_internal::endpoints;
use mixly_internal::endpoints::status::MIXLY_GATEWAY_VERSION;
use mixly_internal::error;
use mixly_internal::gateway_util;
use mixly_internal::observability::{self, LogFormat};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Use the `mixly.toml` config file at the specified path. Incompatible with `--default-config`
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Use the built-in default config. Incompatible with `--config-file`
    #[arg(long)]
    default_config: bool,

    /// Sets the log format used for all gateway logs.
    #[arg(long)]
    #[arg(value_enum)]
    #[clap(default_value_t = LogFormat::default())]
    log_format: LogFormat,
}

async fn add_version_header(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        "x-mixly-gateway-version",
        HeaderValue::from_static(MIXLY_GATEWAY_VERSION),
    );
    response
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    // Set up logs and metrics immediately, so that we can use `tracing`.
    let delayed_log_config =
        observability::setup_observability(args.log_format).or_exit("Failed to set up logs");

    tracing::info!("Starting Mixly Gateway {MIXLY_GATEWAY_VERSION}");

    let metrics_handle = observability::setup_metrics().or_exit("Failed to set up metrics");

    if args.config_file.is_some() && args.default_config {
        tracing::error!("Cannot specify both `--config-file` and `--default-config`");
        std::process::exit(1);
    }

    if !args.default_config && args.config_file.is_none() {
        tracing::warn!("No config-related arguments were given. Use `--default-config` to start the gateway with the default config.");
    }

    let config = if let Some(path) = &args.config_file {
        Arc::new(
            Config::load_and_verify_from_path(path)
                .await
                .or_exit("Failed to load config"),
        )
    } else {
        tracing::warn!("No config file provided, so usage records are kept in memory and suggestions use OpenAI defaults. Use `--config-file path/to/mixly.toml` to specify a config file.");
        Arc::new(Config::default())
    };

    if config.gateway.debug {
        delayed_log_config
            .delayed_debug_logs
            .enable_debug()
            .or_exit("Failed to enable debug logs");
    }

    // Set debug mode
    error::set_debug(config.gateway.debug).or_exit("Failed to set debug mode");

    // Initialize AppState
    let app_state = gateway_util::AppStateData::new(config.clone())
        .await
        .or_exit("Failed to initialize AppState");

    let _lock_pruning = gateway_util::start_lock_pruning(
        app_state.usage_meter.clone(),
        Duration::from_secs(config.gateway.lock_prune_interval_secs),
    );

    let router = Router::new()
        .route("/suggest", post(endpoints::suggest::suggest_handler))
        .route(
            "/upgrade-premium",
            post(endpoints::premium::upgrade_premium_handler),
        )
        .route(
            "/deeplink/{provider}",
            get(endpoints::deeplink::deeplink_handler),
        )
        .route("/health", get(endpoints::status::health_handler))
        .route("/version", get(endpoints::status::version_handler))
        .route(
            "/metrics",
            get(move || std::future::ready(metrics_handle.render())),
        )
        .fallback(endpoints::fallback::handle_404)
        .layer(axum::middleware::from_fn(add_version_header))
        // We log failed requests messages at 'DEBUG', since we already have our own error-logging code
        .layer(TraceLayer::new_for_http().on_failure(DefaultOnFailure::new().level(Level::DEBUG)))
        .with_state(app_state.clone());

    // Bind to the socket address specified in the config, or default to 0.0.0.0:5000
    let bind_address = config
        .gateway
        .bind_address
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 5000)));

    let listener = match tokio::net::TcpListener::bind(bind_address).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            tracing::error!(
                "Failed to bind to socket address {bind_address}: {e}. Tip: Ensure no other process is using port {} or try a different port.",
                bind_address.port()
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to bind to socket address {bind_address}: {e}");
            std::process::exit(1);
        }
    };
    // This will give us the chosen port if the user specified a port of 0
    let actual_bind_address = listener
        .local_addr()
        .or_exit("Failed to get bind address from listener");

    let config_path_pretty = if let Some(path) = &args.config_file {
        format!("config file `{}`", path.to_string_lossy())
    } else {
        "no config file".to_string()
    };

    tracing::info!(
        "Mixly Gateway is listening on {actual_bind_address} with {config_path_pretty}, usage storage `{}` and suggestion provider `{}`.",
        app_state.usage_meter.store().backend_name(),
        app_state.suggestion_provider.provider_type(),
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let signal = shutdown_signal().await;
            tracing::info!("Received {signal}, draining in-flight requests");
        })
        .await
        .or_exit("Server error");
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    tokio::select! {
        () = ctrl_c() => "SIGINT",
        () = terminate() => "SIGTERM",
    }
}

async fn ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!("Cannot listen for SIGTERM: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Startup-only error exit: logs `context` with the cause and exits with status 1.
/// Nothing past server start should use this.
trait OrExit<T> {
    fn or_exit(self, context: &str) -> T;
}

impl<T, E: Display> OrExit<T> for Result<T, E> {
    fn or_exit(self, context: &str) -> T {
        self.unwrap_or_else(|e| {
            tracing::error!("{context}: {e}");
            std::process::exit(1)
        })
    }
}
