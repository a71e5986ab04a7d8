//! tcprelay - Transparent TCP relay
//!
//! Accepts TCP clients on a local port, optionally restricts them to an
//! allowlist of source IPs and forwards bytes to a single upstream target.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tcprelay::{
    config::{ConfigManager, ProxyConfig},
    ConnectionManager,
};

/// CLI arguments for tcprelay
#[derive(Parser, Debug)]
#[command(name = "tcprelay")]
#[command(about = "tcprelay - Transparent TCP relay with source IP allowlisting")]
#[command(version)]
#[command(long_about = "
tcprelay - Transparent TCP relay with source IP allowlisting

Configuration priority (highest to lowest):
1. Command-line arguments
2. Environment variables
3. Configuration file
4. Built-in defaults

Environment variables:
  TARGET_HOST  - Upstream host (default 127.0.0.1)
  TARGET_PORT  - Upstream port (default 9000)
  LISTEN_PORT  - Local port to accept on (default 9001)
  ALLOWED_IPS  - Comma-separated client IPs; empty allows all
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Local address to bind (e.g., 127.0.0.1)")]
    pub bind: Option<IpAddr>,

    #[arg(short = 'p', long, help = "Local port to accept connections on")]
    pub listen_port: Option<u16>,

    #[arg(long, help = "Upstream host to relay to")]
    pub target_host: Option<String>,

    #[arg(long, help = "Upstream port to relay to")]
    pub target_port: Option<u16>,

    #[arg(long, help = "Comma-separated list of allowed client IPs")]
    pub allowed_ips: Option<String>,

    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "Upstream connect timeout (e.g., 10s)"
    )]
    pub connect_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => ConfigManager::load_from_file(path)?,
        None => ProxyConfig::default(),
    };

    init_tracing(&args, &config)?;

    info!("Starting tcprelay v{}", env!("CARGO_PKG_VERSION"));

    config.apply_env(|key| std::env::var(key).ok());
    config.merge_with_cli_args(
        args.bind,
        args.listen_port,
        args.target_host.as_deref(),
        args.target_port,
        args.allowed_ips.as_deref(),
        args.connect_timeout,
        args.log_level.as_deref(),
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    config.log_summary();

    if args.validate_config {
        info!("Configuration is valid");
        return Ok(());
    }

    let mut connection_manager = ConnectionManager::new(Arc::new(config));

    if let Err(e) = connection_manager.start().await {
        error!(error = %e, "Fatal listener error");
        return Err(e);
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &ProxyConfig) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        args.log_level.as_deref().unwrap_or(&config.logging.level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
