// SPDX-License-Identifier: MIT

//! `pmdd` — the Port Mapper Daemon binary.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use meshnode_core::SystemClock;
use meshnode_pmd::{env, LockFile, Server};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "pmdd", about = "Port Mapper Daemon")]
struct Args {
    /// Port to bind the control protocol to.
    #[arg(long, default_value_t = env::port())]
    port: u16,

    /// Milliseconds the registry may stay empty before the daemon exits.
    #[arg(long, default_value_t = env::auto_shutdown_delay().as_millis() as u64)]
    auto_shutdown_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let _lock = match env::lock_path(args.port) {
        Some(path) => Some(LockFile::acquire(&path).context("failed to acquire pmd lock")?),
        None => {
            info!("no state directory available, running without a singleton lock");
            None
        }
    };

    let listener = TcpListener::bind(("0.0.0.0", args.port))
        .await
        .with_context(|| format!("failed to bind pmd on port {}", args.port))?;
    info!(port = args.port, "pmd listening");

    let server = Server::new(Box::new(SystemClock), Duration::from_millis(args.auto_shutdown_ms));
    server.serve(listener).await;

    info!("pmd exited");
    Ok(())
}
