//! Dat Desk RPC Server - JSON-RPC backend for Electron IPC.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the dat-desk library
//! for communication with the Electron main process.

mod changes;
mod handler;
mod server;
mod wrapper;

use anyhow::Result;
use clap::Parser;
use dat_desk::{Desk, DisconnectedNetwork};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "dat-desk-rpc")]
#[command(about = "JSON-RPC server for Dat Desktop")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Data directory for the registry snapshot (defaults to the platform
    /// data dir)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Author recorded on dats created without an explicit author
    #[arg(long, default_value = "anonymous")]
    author: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Dat Desk RPC Server");

    let data_dir = args.data.unwrap_or_else(dat_desk::default_data_dir);
    info!("Data directory: {}", data_dir.display());

    // The swarm transport ships separately; until it is wired in, sessions
    // keep retrying against an unreachable network and the registry stays
    // fully usable.
    let desk = Desk::open(data_dir, Arc::new(DisconnectedNetwork)).await?;

    // Start the server
    let (addr, state) = server::start_server(desk, args.author, &args.host, args.port).await?;

    // Print port for Electron to read (intentional stdout for IPC)
    // This format must match what the preload bridge expects
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown: ctrl-c from a terminal, or the `shutdown` RPC
    // method from Electron
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, exiting");
        }
        _ = shutdown_rx.changed() => {
            info!("Shutdown requested over RPC, exiting");
        }
    }

    state.desk.shutdown().await;

    Ok(())
}
