//! Serial Bridge server: entry point.
//!
//! Exposes every configured serial line ("node") on its own raw TCP port and,
//! optionally, serves a second set of serial ports over one multiplexed TCP
//! port.
//!
//! # Usage
//!
//! ```text
//! serial-bridge [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>   Configuration file [default: serial-bridge.toml]
//!       --list            Print the configured devices as JSON and exit
//! ```
//!
//! | Variable               | Default              | Description          |
//! |------------------------|----------------------|----------------------|
//! | `SERIAL_BRIDGE_CONFIG` | `serial-bridge.toml` | Configuration file   |
//! | `RUST_LOG`             | config `log_level`   | Log filter           |
//!
//! # Threads and tasks
//!
//! ```text
//! node-<name>          one accept thread per node
//! node-<name>-client   one thread per raw TCP client
//! serial-poller        the only reader of node serial ports
//! tokio runtime        multiplex accept loop, connections, multiplex poller
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use serial_bridge::application::device::DeviceRegistry;
use serial_bridge::application::poller::spawn_poller;
use serial_bridge::infrastructure::control::describe_config;
use serial_bridge::infrastructure::events::TracingObserver;
use serial_bridge::infrastructure::network::MultiplexServer;
use serial_bridge::infrastructure::runtime::build_registry;
use serial_bridge::infrastructure::serial::SystemPortOpener;
use serial_bridge::infrastructure::storage::config::{load_config, MultiplexConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serial port to TCP bridge.
#[derive(Debug, Parser)]
#[command(
    name = "serial-bridge",
    about = "Exposes serial ports as TCP endpoints",
    version
)]
struct Cli {
    /// Path of the TOML configuration file.
    ///
    /// A missing file starts the bridge with no devices.
    #[arg(
        short,
        long,
        default_value = "serial-bridge.toml",
        env = "SERIAL_BRIDGE_CONFIG"
    )]
    config: PathBuf,

    /// Print the configured devices as JSON and exit.
    ///
    /// Reads the configuration only: no TCP port is bound and no serial port
    /// is opened, so this works next to a running bridge.
    #[arg(long)]
    list: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.bridge.log_level)),
        )
        .init();

    if cli.list {
        let devices = describe_config(&config).context("invalid device configuration")?;
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    let registry = Arc::new(
        build_registry(
            &config,
            Arc::new(SystemPortOpener),
            Arc::new(TracingObserver),
        )
        .context("invalid device configuration")?,
    );

    info!("serial bridge starting with {}", cli.config.display());

    for node in registry.nodes() {
        node.serve()
            .with_context(|| format!("failed to start listener for {node}"))?;
    }
    if config.bridge.auto_connect {
        connect_all(&registry);
    }

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));

    let poller = spawn_poller(
        Arc::clone(&registry),
        Duration::from_micros(config.bridge.poll_interval_us),
        Arc::clone(&running),
    )?;

    if config.multiplex.enabled {
        start_multiplex(&config.multiplex, Arc::clone(&running)).await?;
    }

    info!("ready");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
    }
    running.store(false, Ordering::Relaxed);

    if !matches!(tokio::task::spawn_blocking(move || poller.join()).await, Ok(Ok(()))) {
        warn!("serial poller did not stop cleanly");
    }
    for device in registry.iter().filter(|d| d.is_connected()) {
        if let Err(e) = device.serial_disconnect() {
            warn!("{}: disconnect failed: {e}", device.name());
        }
    }

    info!("serial bridge stopped");
    Ok(())
}

/// Connects every device, logging failures.  A device that fails to connect
/// stays disconnected; the others are unaffected.
fn connect_all(registry: &DeviceRegistry) {
    for device in registry.iter() {
        if let Err(e) = device.serial_connect() {
            warn!("{}: not connected at startup: {e} [{}]", device.name(), e.code());
        }
    }
}

async fn start_multiplex(config: &MultiplexConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let server = Arc::new(
        MultiplexServer::new(config, Arc::new(SystemPortOpener))
            .context("failed to open multiplex devices")?,
    );
    let listener = TcpListener::bind((config.bind_address.as_str(), config.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind multiplex listener on {}:{}",
                config.bind_address, config.port
            )
        })?;

    tokio::spawn(Arc::clone(&server).run_poller(Arc::clone(&running)));
    tokio::spawn(server.serve(listener, running));
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
