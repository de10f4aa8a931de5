//! Bytecask Server Binary
//!
//! Opens the store, starts the maintenance loops and serves the TCP protocol.

use std::process;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytecask::network::Server;
use bytecask::{Config, Maintenance, RecoveryMode, Store};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// Bytecask Server
#[derive(Parser, Debug)]
#[command(name = "bytecask-server")]
#[command(about = "Log-structured key-value store server")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./bytecask_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6969")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "128")]
    max_connections: usize,

    /// fsync every write before acknowledging it
    #[arg(long)]
    fsync: bool,

    /// Rebuild the index from the datafiles, ignoring the hint file
    #[arg(long)]
    scan: bool,

    /// Datafile size in MB at which the active file rotates
    #[arg(long, default_value = "64")]
    datafile_mb: u64,

    /// Seconds between hint file flushes
    #[arg(long, default_value = "60")]
    flush_secs: u64,

    /// Seconds between rotation checks
    #[arg(long, default_value = "60")]
    rotate_secs: u64,

    /// Seconds between compactions
    #[arg(long, default_value = "180")]
    compact_secs: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bytecask=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Bytecask Server v{}", bytecask::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);
    tracing::info!("Listen address: {}", args.listen);

    let recovery_mode = if args.scan {
        RecoveryMode::Scan
    } else {
        RecoveryMode::Auto
    };

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .fsync_on_write(args.fsync)
        .recovery_mode(recovery_mode)
        .max_datafile_size(args.datafile_mb * 1024 * 1024)
        .flush_interval(Duration::from_secs(args.flush_secs))
        .rotation_interval(Duration::from_secs(args.rotate_secs))
        .compaction_interval(Duration::from_secs(args.compact_secs))
        .build();

    let store = match Store::open(config.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            process::exit(1);
        }
    };

    let maintenance = match Maintenance::start(Arc::clone(&store)) {
        Ok(maintenance) => maintenance,
        Err(e) => {
            tracing::error!("Failed to start maintenance: {}", e);
            process::exit(1);
        }
    };

    let mut server = Server::new(config, store);
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received Ctrl+C, initiating shutdown...");
        shutdown.store(true, Ordering::Release);
    }) {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
    }

    let served = server.run();
    if let Err(e) = &served {
        tracing::error!("Server error: {}", e);
    }

    if let Err(e) = maintenance.shutdown() {
        tracing::error!("Failed to shut down cleanly: {}", e);
        process::exit(1);
    }
    if served.is_err() {
        process::exit(1);
    }

    tracing::info!("Server stopped");
}
