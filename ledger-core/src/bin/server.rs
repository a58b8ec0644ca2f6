//! Ledger server binary
//!
//! Boots a ledger from `LEDGER_CONFIG` (TOML file) or the `LEDGER_*` environment
//! variables and serves `/health` and `/metrics` until interrupted.

use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use wallet_ledger::{api, Backend, Config, Ledger, LedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting wallet ledger");

    // Load configuration
    let config = match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("Invalid LEDGER_* environment")?,
    };

    match config.storage.backend {
        Backend::Memory => {
            tracing::warn!("Using the in-memory backend; journals are lost on exit");
            serve(Ledger::in_memory(config)?).await
        }
        Backend::RocksDb => serve_rocksdb(config).await,
    }
}

#[cfg(feature = "rocksdb")]
async fn serve_rocksdb(config: Config) -> anyhow::Result<()> {
    let data_dir = config.storage.data_dir.clone();
    let ledger = Ledger::open(config)
        .with_context(|| format!("Failed to open ledger at {}", data_dir.display()))?;
    serve(ledger).await
}

#[cfg(not(feature = "rocksdb"))]
async fn serve_rocksdb(_config: Config) -> anyhow::Result<()> {
    anyhow::bail!("RocksDB backend requested but this binary was built without the `rocksdb` feature")
}

async fn serve<S: LedgerStore + 'static>(ledger: Ledger<S>) -> anyhow::Result<()> {
    let ledger = Arc::new(ledger);
    let addr = ledger.config().metrics_listen_addr.clone();
    let app = api::router(ledger.clone());

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP endpoint on {}", addr))?;
    tracing::info!(addr = %addr, "Ledger listening");
    tracing::info!("   GET  /health - Health check");
    tracing::info!("   GET  /metrics - Prometheus metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let staged = ledger.journals().staged_journals();
    if !staged.is_empty() {
        tracing::warn!(count = staged.len(), "Discarding uncommitted staged journals");
    }
    tracing::info!("Shutting down wallet ledger");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c; serving until killed");
        std::future::pending::<()>().await;
    }
}
