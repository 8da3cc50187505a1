//! Live location tracker.
//!
//! Streams simulated position fixes to a livetrack server over WebSocket.
//! The connection is re-established 3 seconds after every failure, forever,
//! until tracking is stopped.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin livetrack-client
//! cargo run --bin livetrack-client -- --url ws://192.168.5.75:40510 --no-console
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;

use livetrack_client::{
    config::{DEFAULT_SERVER_URL, TrackerConfig},
    connection::ConnectionManager,
    console::{run_console, spawn_console},
    device::{DEFAULT_DEVICE_ID_FILE, load_or_create_device_id},
    error::ClientError,
    lifecycle::LifecycleController,
    session::TrackingSession,
    source::SimulatedPositionSource,
    status::LogStatusSink,
    transport::WebSocketTransport,
};
use livetrack_shared::{
    logger::setup_logger, signal::shutdown_signal, time::SystemClock, wire::DeviceId,
};

#[derive(Parser, Debug)]
#[command(name = "livetrack-client")]
#[command(about = "Streams device positions to a livetrack server over WebSocket", long_about = None)]
struct Args {
    /// WebSocket server URL
    #[arg(short = 'u', long, default_value = DEFAULT_SERVER_URL)]
    url: String,

    /// Device ID to report (overrides the device id file)
    #[arg(short = 'd', long)]
    device_id: Option<String>,

    /// File holding the persisted device ID
    #[arg(long, default_value = DEFAULT_DEVICE_ID_FILE)]
    device_id_file: PathBuf,

    /// Delay before reconnecting after a connection failure (milliseconds)
    #[arg(long, default_value_t = 3_000)]
    reconnect_delay_ms: u64,

    /// Give up on a WebSocket handshake after this long (milliseconds)
    #[arg(long, default_value_t = 10_000)]
    handshake_timeout_ms: u64,

    /// Interval between position fixes (milliseconds)
    #[arg(short = 'i', long, default_value_t = 5_000)]
    interval_ms: u64,

    /// Latitude the simulated walk circles around
    #[arg(long, default_value_t = 35.681_236, allow_negative_numbers = true)]
    origin_lat: f64,

    /// Longitude the simulated walk circles around
    #[arg(long, default_value_t = 139.767_125, allow_negative_numbers = true)]
    origin_lng: f64,

    /// Start tracking immediately and run until Ctrl+C, without the prompt
    #[arg(long)]
    no_console: bool,
}

impl Args {
    fn into_config(self) -> Result<(TrackerConfig, bool), ClientError> {
        let config = TrackerConfig {
            url: self.url,
            device_id: self.device_id,
            device_id_file: self.device_id_file,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            sample_interval: Duration::from_millis(self.interval_ms),
            origin_lat: self.origin_lat,
            origin_lng: self.origin_lng,
        }
        .validate()?;
        Ok((config, self.no_console))
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();

    if let Err(e) = run(args).await {
        tracing::error!("Client error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ClientError> {
    let (config, no_console) = args.into_config()?;

    let device_id = match &config.device_id {
        Some(explicit) => DeviceId::new(explicit.as_str())
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?,
        None => load_or_create_device_id(&config.device_id_file)?,
    };
    tracing::info!("Device '{}' reporting to {}", device_id, config.url);

    // Wire the collaborators once; every start gets a fresh session and socket.
    let transport = Arc::new(WebSocketTransport::new(config.url.clone()));
    let source = Arc::new(SimulatedPositionSource::new(
        config.origin_lat,
        config.origin_lng,
        config.sample_interval,
        Arc::new(SystemClock),
    ));
    let sink = Arc::new(LogStatusSink);
    let connection_config = config.connection_config();

    let factory = move || {
        TrackingSession::new(
            source.clone(),
            ConnectionManager::new(transport.clone(), connection_config.clone()),
            sink.clone(),
            device_id.clone(),
        )
    };
    let controller = LifecycleController::new(Arc::new(factory));

    if no_console {
        controller.start().await;
        shutdown_signal().await;
    } else {
        println!("\nCommands: start, stop, status, quit. Press Ctrl+C to exit.\n");
        run_console(&controller, spawn_console(), shutdown_signal()).await;
    }

    controller.shutdown().await;
    Ok(())
}
