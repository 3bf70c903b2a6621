//! Redundancy Scout - coordinated wallet activity detector for Solana
//!
//! Entry point: wires the watch-list, transaction store, ingestion
//! transport and correlation engine together and runs until Ctrl-C or
//! SIGTERM.

use anyhow::Context;
use redundancy_scout::config::{AppConfig, MetricsConfig, TransportKind, WatchlistConfig};
use redundancy_scout::correlation::{CorrelationEngine, CorrelationSink, LoggingSignalSink};
use redundancy_scout::ingestion::{
    EventSink, HttpRpcClient, PollingConfig, PollingSource, SignatureDeduplicator,
    SubscriptionConfig, SubscriptionSource, TradeSource, TransactionStore,
};
use redundancy_scout::metrics::{metrics_router, Metrics};
use redundancy_scout::telemetry;
use redundancy_scout::watchlist::{SqliteWatchlist, StaticWatchlist, WatchlistProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    telemetry::init_tracing(config.logging.format).context("Failed to initialize tracing")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::info!("Starting Redundancy Scout v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        transport = ?config.ingestion.transport,
        window_seconds = config.correlation.window_seconds,
        min_addresses = config.correlation.min_addresses,
        "Configuration loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let watchlist = build_watchlist(&config.watchlist).await?;

    let store: Arc<dyn TransactionStore> = Arc::new(
        HttpRpcClient::from_config(&config.rpc).context("Failed to build RPC client")?,
    );
    let dedupe = Arc::new(SignatureDeduplicator::new(config.ingestion.dedupe_capacity));

    let engine = Arc::new(
        CorrelationEngine::new(config.correlation.clone())
            .with_sink(Arc::new(LoggingSignalSink))
            .with_metrics(metrics.clone()),
    );
    let sink: Arc<dyn EventSink> = Arc::new(CorrelationSink::new(engine.clone()));

    let source: Arc<dyn TradeSource> = match config.ingestion.transport {
        TransportKind::Polling => Arc::new(
            PollingSource::new(
                store,
                watchlist,
                dedupe,
                sink,
                PollingConfig::from_app(&config),
            )
            .with_metrics(metrics.clone()),
        ),
        TransportKind::Subscription => Arc::new(
            SubscriptionSource::new(
                store,
                watchlist,
                dedupe,
                sink,
                SubscriptionConfig::from_app(&config),
            )
            .with_metrics(metrics.clone()),
        ),
    };

    let shutdown = CancellationToken::new();
    if config.metrics.enabled {
        spawn_metrics_server(&config.metrics, metrics.clone(), shutdown.clone()).await?;
    }

    tracing::info!(source = source.name(), "Ingestion starting");
    let runner = source.clone();
    let mut ingestion = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        result = &mut ingestion => {
            shutdown.cancel();
            return result
                .context("Ingestion task panicked")?
                .context("Ingestion stopped");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    source.stop();
    shutdown.cancel();
    ingestion
        .await
        .context("Ingestion task panicked")?
        .context("Ingestion failed during shutdown")?;

    let patterns = engine.active_patterns();
    if !patterns.is_empty() {
        tracing::info!(count = patterns.len(), "Active patterns at shutdown");
    }

    tracing::info!("Redundancy Scout stopped");
    Ok(())
}

/// SQLite watch-list when a database is configured, static list otherwise
async fn build_watchlist(config: &WatchlistConfig) -> anyhow::Result<Arc<dyn WatchlistProvider>> {
    match &config.database_path {
        Some(path) => {
            let watchlist = SqliteWatchlist::open(path, config.categories.clone(), config.limit)
                .await
                .with_context(|| format!("Failed to open watch-list database {}", path.display()))?;
            Ok(Arc::new(watchlist))
        }
        None => Ok(Arc::new(StaticWatchlist::from_config(config))),
    }
}

/// Serve `/metrics` and `/health` until `shutdown` fires
async fn spawn_metrics_server(
    config: &MetricsConfig,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid metrics address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?;

    let app = metrics_router(metrics).layer(TraceLayer::new_for_http());
    tracing::info!(%addr, "Metrics server listening");

    tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
