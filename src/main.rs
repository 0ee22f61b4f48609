//! breaker-proxy
//!
//! A forward proxy that tunnels CONNECT requests and guards a configured set
//! of upstream hosts with circuit breakers. While a host's breaker is open,
//! clients are refused immediately instead of waiting on a failing upstream.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  BREAKER PROXY                   │
//!                     │                                                  │
//!   Client            │  ┌──────────┐   ┌──────────┐   ┌─────────────┐   │
//!   ──────────────────┼─▶│   net    │──▶│   http   │──▶│   routing   │   │
//!                     │  │ listener │   │  server  │   │  admission  │   │
//!                     │  └──────────┘   └──────────┘   └──────┬──────┘   │
//!                     │                     allow ┌───────────┤ pass     │
//!                     │                           ▼           ▼          │
//!                     │                   ┌─────────────┐ ┌──────────┐   │
//!   Upstream ◀────────┼───────────────────│   tunnel    │ │ passthru │───┼──▶ Upstream
//!                     │                   │  + breaker  │ └──────────┘   │
//!                     │                   └─────────────┘                │
//!                     │  ┌────────────────────────────────────────────┐  │
//!                     │  │ config · observability · lifecycle · admin │  │
//!                     │  └────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use breaker_proxy::admin::{self, AdminState};
use breaker_proxy::config::load_config;
use breaker_proxy::lifecycle::signals::wait_for_signal;
use breaker_proxy::net::Listener;
use breaker_proxy::observability::{logging, metrics};
use breaker_proxy::{ProxyServer, Shutdown};

#[derive(Parser)]
#[command(name = "breaker-proxy")]
#[command(about = "Tunneling proxy with per-host circuit breakers", long_about = None)]
struct Args {
    /// Configuration file (TOML, or legacy JSON with a .json extension)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error loading configuration {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    if args.verbose {
        config.observability.log_level = "debug".to_string();
    }

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting breaker-proxy");

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(&config);

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    let admin_task = if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState {
            registry: server.registry(),
            tracker: server.tracker(),
            api_key: config.admin.api_key.as_str().into(),
        };
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::serve_admin(admin_listener, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    server.run(listener, shutdown.subscribe()).await?;

    if let Some(task) = admin_task {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
