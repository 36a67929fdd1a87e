//! Kimchi Premium Engine Binary
//!
//! Loads reference data, starts both exchange streams and serves the ranked
//! market list until SIGINT/SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin kimchi-premium
//! ```
//!
//! # Environment Variables
//!
//! - `UPBIT_WS_URL`, `BINANCE_WS_URL`: Stream endpoints
//! - `UPBIT_REST_URL`, `BINANCE_REST_URL`, `FX_REST_URL`: Reference data endpoints
//! - `KIMCHI_SOCKET_TIMEOUT_MS`: Liveness timeout and reconnect delay (default: 5000)
//! - `KIMCHI_THROTTLE_MS`: Snapshot publication interval (default: 200)
//! - `KIMCHI_FX_REFRESH_SECS`: FX refresh period (default: 60)
//! - `KIMCHI_HTTP_TIMEOUT_SECS`: REST request timeout (default: 10)
//! - `KIMCHI_HEALTH_PORT`: Health and market list HTTP port (default: 8083)
//! - `KIMCHI_TRADE_SYMBOL`: Market whose trades are streamed (default: KRW-BTC)
//! - `KIMCHI_MESSAGE_FORMAT`: Upbit payload format, SIMPLE | DEFAULT (default: SIMPLE)
//! - `KIMCHI_SYMBOL_OVERRIDES`: Counterpart overrides (default: BTT=BTTC,BTG=,NU=,POLY=)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: kimchi-premium)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use kimchi_premium::infrastructure::telemetry;
use kimchi_premium::{
    BinanceConnection, Correlator, EngineConfig, ExchangeRestClient, FeedConnection, FxRefresher,
    HealthServer, HealthServerState, MarketDataSource, MarketEngine, MarketSink, MarketStore,
    SubscriptionSpec, UpbitConnection, bootstrap, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Kimchi Premium engine");

    let _metrics_handle = init_metrics();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Shared state and the two exchange connections feeding it
    let store = Arc::new(MarketStore::new(Correlator::new(
        config.symbol_mapper.clone(),
    )));
    let sink: Arc<dyn MarketSink> = Arc::clone(&store) as Arc<dyn MarketSink>;

    let upbit: Arc<dyn FeedConnection> = Arc::new(UpbitConnection::upbit(
        config.streams.upbit_connection(),
        Arc::clone(&sink),
    ));
    let binance: Arc<dyn FeedConnection> = Arc::new(BinanceConnection::binance(
        config.streams.binance_connection(),
        sink,
    ));
    let engine = Arc::new(MarketEngine::new(Arc::clone(&store), upbit, binance));

    // Reference data
    let rest: Arc<dyn MarketDataSource> = Arc::new(
        ExchangeRestClient::new(config.rest.clone()).context("failed to build REST client")?,
    );
    let plan = bootstrap(&store, rest.as_ref())
        .await
        .context("reference data bootstrap failed")?;

    let mut primary = SubscriptionSpec::tickers(plan.primary_symbols.iter().cloned())
        .with_format(config.streams.message_format);
    if plan.primary_symbols.contains(&config.trade_symbol) {
        primary = primary.with_trades([config.trade_symbol.clone()]);
    } else {
        tracing::warn!(symbol = %config.trade_symbol, "Trade symbol not listed, trade feed disabled");
    }
    let counterpart = SubscriptionSpec::tickers(plan.counterpart_symbols.iter().cloned());

    engine
        .start(primary, counterpart)
        .context("failed to start exchange streams")?;

    // FX refresh
    let fx_handle = FxRefresher::new(
        Arc::clone(&rest),
        Arc::clone(&store),
        config.fx_refresh_interval,
    )
    .spawn(shutdown_token.child_token());

    // Health, metrics and market list
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&engine),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(
        primary = plan.primary_symbols.len(),
        counterpart = plan.counterpart_symbols.len(),
        "Kimchi Premium engine ready"
    );

    await_shutdown(shutdown_token).await;

    engine.reset_all();
    let _ = fx_handle.await;
    let _ = health_handle.await;

    tracing::info!("Kimchi Premium engine stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

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

/// Log the parsed configuration.
fn log_config(config: &EngineConfig) {
    tracing::info!(
        socket_timeout_ms = config.streams.socket_timeout.as_millis(),
        throttle_ms = config.streams.throttle_interval.as_millis(),
        fx_refresh_secs = config.fx_refresh_interval.as_secs(),
        health_port = config.server.health_port,
        trade_symbol = %config.trade_symbol,
        format = config.streams.message_format.as_str(),
        overrides = config.symbol_mapper.override_count(),
        "Configuration loaded"
    );
    tracing::debug!(
        upbit_ws = %config.streams.upbit_url,
        binance_ws = %config.streams.binance_url,
        upbit_rest = %config.rest.upbit_base_url,
        binance_rest = %config.rest.binance_base_url,
        fx_rest = %config.rest.fx_base_url,
        "Endpoints"
    );
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
}
