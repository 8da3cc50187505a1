//! Development receiver for livetrack trackers.
//!
//! Accepts WebSocket connections on `/` and keeps the latest position of
//! every device. `GET /api/devices` lists them.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin livetrack-server
//! cargo run --bin livetrack-server -- --host 0.0.0.0 --port 40510
//! ```

use std::sync::Arc;

use clap::Parser;

use livetrack_server::{AppState, Server};
use livetrack_shared::logger::setup_logger;

#[derive(Parser, Debug)]
#[command(name = "livetrack-server")]
#[command(about = "Development receiver for livetrack location streams", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "40510")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    let server = Server::new(Arc::new(AppState::new()));
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
