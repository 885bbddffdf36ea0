//! `driftlessctl` - a small CLI exercising the `driftless` library against a
//! configurable host list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use driftless::{
    JsonFileCacheStore, NtpError, Options, SafeTime,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "driftlessctl", version, about = "Query a trustworthy wall clock over NTP")]
struct Args {
    /// Configuration file path (TOML); missing file falls back to built-in defaults.
    #[arg(short, long, default_value = "driftless.toml")]
    config: PathBuf,

    /// Verbose (debug-level) logging. Overrides `RUST_LOG` when set.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-shot, uncached request against the first configured host.
    GetTime,
    /// Trigger a sync and wait for it to finish, printing the outcome.
    Sync,
    /// Print the cached time, syncing first if no valid cache exists.
    Now,
}

/// Demo-only configuration; the library itself takes no files, env vars, or CLI args.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DriftlessConfig {
    #[serde(default = "default_hosts")]
    hosts: Vec<String>,
    #[serde(default = "default_connection_timeout_ms")]
    connection_timeout_ms: u64,
    #[serde(default)]
    max_retry_per_host: u32,
    #[serde(default)]
    max_retry_loop: u32,
    #[serde(default)]
    delay_between_retry_loop_ms: u64,
    #[serde(default = "default_root_delay_max")]
    root_delay_max: i64,
    #[serde(default = "default_root_dispersion_max")]
    root_dispersion_max: i64,
    #[serde(default = "default_server_response_delay_max_ms")]
    server_response_delay_max_ms: u64,
    #[serde(default)]
    cache_path: Option<PathBuf>,
}

impl Default for DriftlessConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            connection_timeout_ms: default_connection_timeout_ms(),
            max_retry_per_host: 0,
            max_retry_loop: 0,
            delay_between_retry_loop_ms: 0,
            root_delay_max: default_root_delay_max(),
            root_dispersion_max: default_root_dispersion_max(),
            server_response_delay_max_ms: default_server_response_delay_max_ms(),
            cache_path: None,
        }
    }
}

fn default_hosts() -> Vec<String> {
    vec!["pool.ntp.org".to_string()]
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_root_delay_max() -> i64 {
    100
}

fn default_root_dispersion_max() -> i64 {
    100
}

fn default_server_response_delay_max_ms() -> u64 {
    1_500
}

impl DriftlessConfig {
    fn load(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: Self = toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DriftlessConfig::load(&args.config)?;
    info!(hosts = ?config.hosts, "driftlessctl starting");

    let mut builder = Options::builder()
        .hosts(config.hosts.clone())
        .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
        .max_retry_per_host(config.max_retry_per_host)
        .max_retry_loop(config.max_retry_loop)
        .delay_between_retry_loop(Duration::from_millis(config.delay_between_retry_loop_ms))
        .root_delay_max(config.root_delay_max)
        .root_dispersion_max(config.root_dispersion_max)
        .server_response_delay_max(Duration::from_millis(config.server_response_delay_max_ms));

    if let Some(path) = &config.cache_path {
        builder = builder.cache_store(Arc::new(JsonFileCacheStore::new(path.clone())));
    }

    let options = builder.build().context("building driftless options")?;
    let facade = SafeTime::new(options);

    match args.command {
        Command::GetTime => {
            let host = config
                .hosts
                .first()
                .context("no hosts configured")?
                .clone();
            let sample = facade.get_time(&host, 123).await?;
            println!("{}", sample.corrected_ms_at_response);
        }
        Command::Sync => {
            let handle = facade.sync().await;
            while !handle.is_done() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            match facade.now() {
                Ok(ms) => println!("synced: {ms}"),
                Err(NtpError::NoValidCache) => warn!("sync finished without a usable sample"),
                Err(e) => return Err(e.into()),
            }
        }
        Command::Now => match facade.now() {
            Ok(ms) => println!("{ms}"),
            Err(NtpError::NoValidCache) => {
                info!("no cached sample, syncing");
                let handle = facade.sync().await;
                while !handle.is_done() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                println!("{}", facade.now()?);
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
