//! Command-line configuration.

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use codepool::LedgerConfig;

/// In-memory SQLite database, gone on exit.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Log filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Build the log filter from the `RUST_LOG` value, if any.
pub fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Unique code pool service")]
pub struct ServerArgs {
    /// TCP listener for API clients
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// SQLite database path, or `:memory:`
    #[arg(short, long)]
    pub database: String,

    /// Canonicalize imported codes before storing them
    #[arg(long)]
    pub canonicalize_imports: bool,

    /// Reason recorded on a code when it is redeemed
    #[arg(long, default_value = "redeemed")]
    pub redeem_reason: String,
}

impl ServerArgs {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            canonicalize_imports: self.canonicalize_imports,
            redeem_reason: self.redeem_reason.clone(),
        }
    }

    pub fn is_memory_database(&self) -> bool {
        self.database == MEMORY_DATABASE
    }
}
