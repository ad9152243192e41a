//! Ownership of the four transport handles and their creation and
//! destruction order.
//!
//! Creation is strictly context, worker, listener, endpoint; destruction is
//! the exact reverse, and each step is a no-op when its handle is already
//! absent, so teardown is idempotent from any state.

use crate::error::LinkError;
use crate::harness::engine::{Context, EngineConfig, Endpoint, Worker};
use crate::harness::establish::Listener;
use tracing::{info, warn};

#[derive(Default)]
pub struct ResourceSet {
    pub context: Option<Context>,
    pub worker: Option<Worker>,
    pub listener: Option<Listener>,
    pub endpoint: Option<Endpoint>,
}

impl ResourceSet {
    /// Create the context and the worker bound to it.
    ///
    /// On failure the error is returned and already-created handles stay
    /// stored; there is no rollback here, teardown is the separate
    /// idempotent path.
    pub fn initialize(&mut self, engine: &EngineConfig) -> Result<(), LinkError> {
        info!("Initializing resources");

        info!("Initializing context");
        let context = Context::new(engine)?;

        info!("Initializing worker");
        let worker = Worker::new(&context);
        self.context = Some(context);
        self.worker = Some(worker?);

        info!("Initialization complete");
        Ok(())
    }

    /// Release all live handles in reverse creation order. Callable any
    /// number of times from any state.
    pub fn teardown(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            match self.worker.as_mut() {
                Some(worker) => {
                    if let Err(e) = endpoint.close(worker) {
                        warn!(error = %e, "Endpoint close reported an error");
                    }
                }
                // No worker left to drive an asynchronous close; dropping
                // the endpoint closes the socket synchronously.
                None => drop(endpoint),
            }
            info!("Endpoint closed");
        }

        if self.listener.take().is_some() {
            info!("Listener closed");
        }

        if self.worker.take().is_some() {
            info!("Worker closed");
        }

        if self.context.take().is_some() {
            info!("Context closed");
        }
    }

    /// The worker and endpoint pair a ready-hook runs against.
    pub fn link_mut(&mut self) -> Option<(&mut Worker, &Endpoint)> {
        match (self.worker.as_mut(), self.endpoint.as_ref()) {
            (Some(worker), Some(endpoint)) => Some((worker, endpoint)),
            _ => None,
        }
    }

    /// Which handles are currently live, for tests.
    #[cfg(test)]
    pub fn snapshot(&self) -> HandleSnapshot {
        HandleSnapshot {
            context: self.context.is_some(),
            worker: self.worker.is_some(),
            listener: self.listener.is_some(),
            endpoint: self.endpoint.is_some(),
        }
    }
}

/// Liveness of each handle at a point in time.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleSnapshot {
    pub context: bool,
    pub worker: bool,
    pub listener: bool,
    pub endpoint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_without_initialize_is_a_noop() {
        let mut resources = ResourceSet::default();
        resources.teardown();
        resources.teardown();
        assert_eq!(resources.snapshot(), HandleSnapshot::default());
    }

    #[test]
    fn test_initialize_then_teardown_releases_everything() {
        let mut resources = ResourceSet::default();
        resources.initialize(&EngineConfig::default()).unwrap();

        let live = resources.snapshot();
        assert!(live.context);
        assert!(live.worker);
        assert!(!live.listener);
        assert!(!live.endpoint);

        resources.teardown();
        assert_eq!(resources.snapshot(), HandleSnapshot::default());

        // A second teardown stays a no-op.
        resources.teardown();
        assert_eq!(resources.snapshot(), HandleSnapshot::default());
    }

    #[test]
    fn test_reinitialize_after_teardown() {
        let mut resources = ResourceSet::default();
        resources.initialize(&EngineConfig::default()).unwrap();
        resources.teardown();
        resources.initialize(&EngineConfig::default()).unwrap();
        assert!(resources.snapshot().worker);
        resources.teardown();
    }
}
