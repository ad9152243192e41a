//! Connection-lifecycle harness over a completion-queue transport.
//!
//! Layers, leaves first:
//! - `waiter`: busy-polling cooperative wait on one outstanding operation
//! - `handoff`: single-slot cell carrying the accepted connection request
//! - `engine`: io_uring-backed context, worker, and endpoint handles
//! - `resources`: handle ownership and creation/destruction order
//! - `establish`: active connect and passive accept paths
//! - `lifecycle`: the run/cleanup state machine exposed to callers

mod engine;
mod establish;
mod handoff;
mod lifecycle;
mod resources;
mod waiter;

pub use engine::{EngineConfig, Endpoint, Worker};
pub use lifecycle::{ConnectionHook, Lifecycle, Mode};
pub use waiter::{wait_on_request, RequestState};
