//! ringlink: a minimal client/server connection harness over io_uring
//!
//! Establishes a single logical connection as client or server, exchanges
//! one null-terminated message, and tears the transport resources down
//! deterministically. The server driver performs two full run/cleanup
//! cycles to demonstrate that teardown releases everything, the bound
//! listener address included.

mod config;
mod error;
mod harness;
mod messaging;

use config::{Config, RunMode};
use harness::{EngineConfig, Lifecycle, Mode};
use messaging::Messaging;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    info!(
        mode = ?config.mode,
        addr = %addr,
        ring_entries = config.ring_entries,
        "Starting ringlink"
    );

    let engine = EngineConfig {
        ring_entries: config.ring_entries,
        listen_backlog: config.listen_backlog,
    };
    let mut lifecycle = Lifecycle::new(engine, Messaging::new());

    match config.mode {
        RunMode::Server => {
            // First cycle: accept one connection and receive one message.
            match lifecycle.run(Mode::Server, addr) {
                Ok(()) => info!("First run successful"),
                Err(e) => error!(error = %e, "First run failed"),
            }
            lifecycle.cleanup();

            // Second cycle proves teardown released every resource; the
            // listener address in particular must be bindable again.
            if let Err(e) = lifecycle.run(Mode::Server, addr) {
                error!(error = %e, "Second run failed");
            }
            lifecycle.cleanup();
        }
        RunMode::Client => {
            if let Err(e) = lifecycle.run(Mode::Client, addr) {
                error!(error = %e, "Client run failed");
            }

            // Give the server time to close its side first.
            thread::sleep(Duration::from_secs(1));
            lifecycle.cleanup();
        }
    }

    Ok(())
}
