//! Lifecycle controller: the state machine exposed to callers.
//!
//! `run(mode, addr)` sequences resource creation, connection establishment,
//! and the injected ready-hook; `cleanup()` is idempotent teardown callable
//! from any state. A controller may be re-run after cleanup, re-acquiring
//! every resource from scratch.

use crate::error::LinkError;
use crate::harness::engine::{EngineConfig, Endpoint, Worker};
use crate::harness::establish;
use crate::harness::resources::ResourceSet;
use std::io;
use std::net::SocketAddr;
use tracing::info;

/// Which side of the connection this run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Client,
    Server,
}

/// Application logic invoked once a connection is ready.
///
/// Exactly one of the two hooks runs per successful connection, selected by
/// the run mode. Both drive their own requests through the worker they are
/// handed.
pub trait ConnectionHook {
    fn on_client_ready(&mut self, worker: &mut Worker, endpoint: &Endpoint)
        -> Result<(), LinkError>;

    fn on_server_ready(&mut self, worker: &mut Worker, endpoint: &Endpoint)
        -> Result<(), LinkError>;
}

pub struct Lifecycle<H> {
    engine: EngineConfig,
    hook: H,
    resources: ResourceSet,
}

impl<H: ConnectionHook> Lifecycle<H> {
    pub fn new(engine: EngineConfig, hook: H) -> Self {
        Self {
            engine,
            hook,
            resources: ResourceSet::default(),
        }
    }

    /// Initialize resources, establish the connection for `mode`, and run
    /// the matching ready-hook.
    ///
    /// Any failure propagates to the caller; handles acquired before the
    /// failure stay live for [`Lifecycle::cleanup`].
    pub fn run(&mut self, mode: Mode, addr: SocketAddr) -> Result<(), LinkError> {
        self.resources.initialize(&self.engine)?;

        match mode {
            Mode::Client => self.run_client(addr),
            Mode::Server => self.run_server(addr),
        }
    }

    fn run_client(&mut self, addr: SocketAddr) -> Result<(), LinkError> {
        let worker = self.resources.worker.as_mut().ok_or_else(missing_worker)?;
        let endpoint = establish::connect(worker, addr)?;
        self.resources.endpoint = Some(endpoint);

        let (worker, endpoint) = self.resources.link_mut().ok_or_else(missing_worker)?;
        self.hook.on_client_ready(worker, endpoint)
    }

    fn run_server(&mut self, addr: SocketAddr) -> Result<(), LinkError> {
        let worker = self.resources.worker.as_mut().ok_or_else(missing_worker)?;
        let listener = establish::listen(worker, addr, self.engine.listen_backlog)?;

        // Store the listener before the accept loop so a failure path still
        // finds it at teardown.
        let slot = listener.slot();
        self.resources.listener = Some(listener);

        let worker = self.resources.worker.as_mut().ok_or_else(missing_worker)?;
        let endpoint = establish::await_connection(worker, &slot)?;
        self.resources.endpoint = Some(endpoint);

        let (worker, endpoint) = self.resources.link_mut().ok_or_else(missing_worker)?;
        self.hook.on_server_ready(worker, endpoint)
    }

    /// Idempotent teardown; callable before any run, after a failed run,
    /// and repeatedly.
    pub fn cleanup(&mut self) {
        info!("Cleaning up resources");
        self.resources.teardown();
    }

    /// Liveness of the four handles, for tests.
    #[cfg(test)]
    pub fn snapshot(&self) -> crate::harness::resources::HandleSnapshot {
        self.resources.snapshot()
    }

    /// The injected hook, for tests inspecting what it captured.
    #[cfg(test)]
    pub fn hook(&self) -> &H {
        &self.hook
    }
}

fn missing_worker() -> LinkError {
    LinkError::Init(io::Error::new(
        io::ErrorKind::Other,
        "worker handle missing after initialization",
    ))
}
