//! Health-aware failover load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                 FAILOVER PROXY                    │
//!                        │                                                   │
//!   Client Request       │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ─────────────────────┼─▶│listener │──▶│  http    │──▶│  dispatcher  │   │
//!                        │  │         │   │  server  │   │ (retry walk) │   │
//!                        │  └─────────┘   └──────────┘   └──────┬───────┘   │
//!                        │                                       │           │
//!                        │                 ┌─────────────────────┤           │
//!                        │                 ▼                     ▼           │
//!                        │        ┌────────────────┐    ┌──────────────┐    │
//!                        │        │ rotation       │    │  transport   │────┼──▶ Backend
//!                        │        │ selector       │    │  + buffered  │◀───┼─── Servers
//!                        │        └───────▲────────┘    │   response   │    │
//!                        │                │ swap        └──────────────┘    │
//!   Client Response      │        ┌───────┴────────┐                         │
//!   ◀────────────────────┼─────── │ health prober  │──── GET /_health ──────┼──▶
//!     (final attempt     │        │ (periodic)     │                         │
//!      committed once)   │        └────────────────┘                         │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use failover_proxy::config::loader::read_config;
use failover_proxy::config::{BalancerConfig, LogFormat};
use failover_proxy::lifecycle;
use failover_proxy::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "failover-proxy")]
#[command(about = "Round-robin HTTP load balancer with health checks and failover", long_about = None)]
struct Cli {
    /// Backend origin URL; repeat for each backend, in order.
    #[arg(short = 'b', long = "backend", value_name = "URL")]
    backends: Vec<String>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Optional TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Merge flags over the file (or default) configuration.
    fn into_config(self) -> Result<BalancerConfig, failover_proxy::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => BalancerConfig::default(),
        };
        if !self.backends.is_empty() {
            config.backends = self.backends.iter().map(|b| b.trim().to_string()).collect();
        }
        if let Some(port) = self.port {
            config.listener.set_port(port);
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failover-proxy: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.observability) {
        eprintln!("failover-proxy: failed to initialize logging: {}", e);
    }

    tracing::info!("failover-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    match lifecycle::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}
