//! codepool-server: serve unique code pools over HTTP, backed by SQLite.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use codepool::store::SqliteStore;
use codepool::CodePools;
use codepool_server::config::log_filter;
use codepool_server::{router, ServerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServerArgs::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let store = if args.is_memory_database() {
        warn!("using an in-memory database; all pools are lost on exit");
        SqliteStore::open_memory()
    } else {
        SqliteStore::open(&args.database)
    }
    .with_context(|| format!("failed to open database {}", args.database))?;

    let pools = CodePools::new(store, args.ledger_config());
    let app = router(pools);

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(addr = %listener.local_addr()?, database = %args.database, "codepool-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("codepool-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
