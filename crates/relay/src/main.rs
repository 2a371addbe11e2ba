// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tl-relay: WebSocket relay for tally stations.
//!
//! The relay keeps no queue state of its own. It stamps the events stations
//! publish, fans them out to every connected station and buffers recent ones
//! so a station that reconnects can catch up.

mod server;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tl_core::ring::DEFAULT_RING_CAPACITY;

/// tl-relay: event relay for tally stations
#[derive(Parser, Debug)]
#[command(name = "tl-relay")]
#[command(about = "WebSocket relay for tally queue stations")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:7890")]
    bind: SocketAddr,

    /// Number of recent events kept for catch-up
    #[arg(long, default_value_t = DEFAULT_RING_CAPACITY)]
    ring_capacity: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tl-relay");
    info!("  Bind address: {}", args.bind);
    info!("  Ring capacity: {}", args.ring_capacity);

    let state = state::RelayState::new(args.ring_capacity);
    server::run(args.bind, state).await
}
