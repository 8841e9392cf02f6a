//! Credential pool maintenance tool
//!
//! Opens the pool snapshot named by the config, runs one administration
//! command against it and exits. Each mutating command saves the snapshot
//! before returning, so workers that reload the pool see the change.

mod commands;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use credential_pool::{JsonFileStore, Pool, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Command;
use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file (falls back to CONFIG_PATH, then ./poolctl.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Initialize tracing with LOG_LEVEL / RUST_LOG support. Logs go to stderr so
/// command output on stdout stays machine readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        config = %config_path.display(),
        store = %config.store.path.display(),
        daily_limit = config.pool.default_daily_limit,
        min_interval_secs = config.pool.default_min_interval_secs,
        "configuration loaded"
    );

    let store = Arc::new(JsonFileStore::new(&config.store.path));
    let pool = Pool::open(store, Arc::new(SystemClock), config.pool)
        .await
        .with_context(|| format!("failed to open pool at {}", config.store.path.display()))?;

    let output = commands::execute(&pool, cli.command).await?;
    println!("{output}");
    Ok(())
}
