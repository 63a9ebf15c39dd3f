//! Trade Ingestion Binary
//!
//! Starts one upstream trade stream per configured symbol and republishes
//! every normalized trade on the bus.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trade-ingestion
//! ```
//!
//! # Environment Variables
//!
//! - `INGEST_SYMBOLS`: Comma-separated symbols (default: btcusdt,ethusdt,solusdt)
//! - `INGEST_EXCHANGE`: Exchange tag on published trades (default: Binance)
//! - `BINANCE_STREAM_URL`: Upstream base URL (default: <wss://stream.binance.com:9443/ws>)
//! - `INGEST_QUEUE_CAPACITY`: Merged queue bound (default: 100)
//! - `INGEST_BACKOFF`: fixed | exponential (default: fixed)
//! - `INGEST_CONNECT_RETRY_SECS`: Wait after a failed dial (default: 5)
//! - `INGEST_RECONNECT_DELAY_SECS`: Wait after a dropped connection (default: 1)
//! - `INGEST_BACKOFF_MAX_SECS`: Exponential cap (default: 60)
//! - `BUS_BACKEND`: redis | memory (default: redis)
//! - `REDIS_ADDR` / `REDIS_URL`: Redis address (default: localhost:6379)
//! - `INGEST_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: trade-ingestion)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use trade_ingestion::application::ports::MessageBus;
use trade_ingestion::application::services::{
    BusPublisher, IngestionHub, SupervisorContext, TradeRelay,
};
use trade_ingestion::infrastructure::binance::{TradeDecoder, WebSocketConnector};
use trade_ingestion::infrastructure::broadcast::BroadcastBus;
use trade_ingestion::infrastructure::config::{BusBackend, IngestionConfig};
use trade_ingestion::infrastructure::health::{HealthServer, HealthServerState};
use trade_ingestion::infrastructure::redis::RedisBus;
use trade_ingestion::infrastructure::telemetry;
use trade_ingestion::init_metrics;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Trade Ingestion");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = IngestionConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let bus = connect_bus(&config).await?;
    let publisher = BusPublisher::new(bus);

    let context = SupervisorContext {
        connector: Arc::new(WebSocketConnector::new()),
        decoder: Arc::new(TradeDecoder::new(config.exchange.clone())),
        backoff: config.backoff.policy(),
    };
    let hub = Arc::new(IngestionHub::new(
        config.hub_config(),
        context,
        &shutdown_token,
    )?);

    for symbol in &config.symbols {
        if let Err(e) = hub.subscribe(symbol) {
            tracing::error!(symbol = %symbol, error = %e, "Failed to subscribe");
            hub.close();
            return Err(e.into());
        }
    }

    // Spawn the single queue consumer
    let trades = hub.trades()?;
    let relay = tokio::spawn(TradeRelay::new(publisher).run(trades));

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(symbols = config.symbols.len(), "Trade ingestion ready");

    await_shutdown(shutdown_token).await;

    hub.close();
    hub.wait_stopped(SHUTDOWN_TIMEOUT).await;
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, relay).await {
        Ok(Ok(stats)) => {
            tracing::info!(
                published = stats.published,
                failed = stats.failed,
                "Relay finished"
            );
        }
        Ok(Err(e)) => tracing::error!(error = %e, "Relay task failed"),
        Err(_) => tracing::warn!("Timed out waiting for relay to drain"),
    }

    tracing::info!("Trade ingestion stopped");

    Ok(())
}

/// Build the configured bus.
async fn connect_bus(
    config: &IngestionConfig,
) -> Result<Arc<dyn MessageBus>, Box<dyn std::error::Error>> {
    match config.bus.backend {
        BusBackend::Redis => {
            let bus = RedisBus::new(&config.bus.redis_url)?;
            match bus.ping().await {
                Ok(()) => tracing::info!("Redis reachable"),
                Err(e) => tracing::warn!(
                    error = %e,
                    "Redis not reachable at startup, publishes will fail until it is"
                ),
            }
            Ok(Arc::new(bus))
        }
        BusBackend::Memory => {
            tracing::info!("Using in-process broadcast bus");
            Ok(Arc::new(BroadcastBus::default()))
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestionConfig) {
    tracing::info!(
        symbols = ?config.symbols,
        exchange = %config.exchange,
        queue_capacity = config.queue_capacity,
        backoff = config.backoff.kind.as_str(),
        bus = config.bus.backend.as_str(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_base_url = %config.stream_base_url,
        redis_url = %config.bus.redis_url,
        "Endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
