//! Transport engine handles built on io_uring.
//!
//! Completion-based model: operations are submitted to the ring with a
//! token in `user_data`, then correlated back to their originator when the
//! completion arrives during a progress step.
//!
//! Creation order is strictly context before worker; the worker owns the
//! ring, the context owns only the negotiated engine parameters.

use crate::error::LinkError;
use crate::harness::handoff::{ConnRequest, RequestSlot};
use crate::harness::waiter::{wait_on_request, CompletionSource, PendingRequest, RequestState};
use io_uring::{opcode, types, IoUring, Probe};
use slab::Slab;
use socket2::SockAddr;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::ptr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Engine parameters resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Submission/completion ring size.
    pub ring_entries: u32,
    /// Listen backlog for the server-side socket.
    pub listen_backlog: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_entries: 64,
            listen_backlog: 128,
        }
    }
}

/// Opcodes the harness submits; all must be present in the kernel's probe.
const REQUIRED_OPCODES: [(u8, &str); 5] = [
    (opcode::Connect::CODE, "connect"),
    (opcode::Accept::CODE, "accept"),
    (opcode::Send::CODE, "send"),
    (opcode::Recv::CODE, "recv"),
    (opcode::Close::CODE, "close"),
];

/// Process-wide handle representing negotiated engine state.
///
/// Owns no kernel resource after construction; it is the vehicle for
/// creating workers and is destroyed only after them.
#[derive(Debug)]
pub struct Context {
    ring_entries: u32,
}

impl Context {
    /// Negotiate engine capabilities and build a context.
    ///
    /// The probe ring stands in for the engine's default configuration: it
    /// is acquired for the duration of capability negotiation and released
    /// when this function returns, whether or not negotiation succeeds.
    pub fn new(engine: &EngineConfig) -> Result<Self, LinkError> {
        let probe_ring = IoUring::new(2).map_err(LinkError::Init)?;
        let mut probe = Probe::new();
        probe_ring
            .submitter()
            .register_probe(&mut probe)
            .map_err(LinkError::Config)?;

        for (code, name) in REQUIRED_OPCODES {
            if !probe.is_supported(code) {
                return Err(LinkError::Config(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("kernel does not support io_uring {}", name),
                )));
            }
        }

        Ok(Self {
            ring_entries: engine.ring_entries,
        })
    }

    pub fn ring_entries(&self) -> u32 {
        self.ring_entries
    }
}

/// State of one submitted operation.
#[derive(Debug)]
enum OpState {
    InFlight(OpKind),
    Done(i32),
}

#[derive(Debug)]
enum OpKind {
    /// Accept delivers its result through the hand-off slot, not through a
    /// pending-request poll.
    Accept { slot: Arc<RequestSlot> },
    Connect,
    Send,
    Recv,
    Close,
}

/// Single-threaded progress-loop handle bound to a context.
///
/// Exactly one live worker per run; all asynchronous operations advance
/// only when the owning thread calls [`Worker::progress`]. The `&mut`
/// receiver forbids concurrent access from multiple threads.
pub struct Worker {
    ring: IoUring,
    ops: Slab<OpState>,
}

impl Worker {
    pub fn new(context: &Context) -> Result<Self, LinkError> {
        let ring = IoUring::new(context.ring_entries()).map_err(LinkError::Init)?;
        Ok(Self {
            ring,
            ops: Slab::with_capacity(16),
        })
    }

    /// One progress step: flush pending submissions without waiting, then
    /// drain every available completion. Returns the number of completions
    /// processed.
    pub fn progress(&mut self) -> io::Result<usize> {
        self.ring.submit()?;

        let mut processed = 0;
        while let Some(cqe) = self.ring.completion().next() {
            processed += 1;

            let token = cqe.user_data() as usize;
            let result = cqe.result();

            let slot = match self.ops.get_mut(token) {
                None => {
                    warn!(token, "Unknown token in completion");
                    continue;
                }
                Some(OpState::InFlight(OpKind::Accept { slot })) => Some(Arc::clone(slot)),
                Some(state) => {
                    *state = OpState::Done(result);
                    None
                }
            };

            // An accept completion hands off through the slot and releases
            // its token here; there is no pending request to poll.
            if let Some(slot) = slot {
                self.ops.remove(token);
                if !slot.offer(result) {
                    debug!("Connection request arrived after capture; discarding");
                    if result >= 0 {
                        unsafe { libc::close(result) };
                    }
                }
            }
        }

        Ok(processed)
    }

    /// Submit an active connect to `remote`. The caller keeps `remote`
    /// alive until the request completes.
    pub fn submit_connect(&mut self, fd: RawFd, remote: &SockAddr) -> RequestState {
        let token = self.ops.insert(OpState::InFlight(OpKind::Connect));
        let entry = opcode::Connect::new(types::Fd(fd), remote.as_ptr(), remote.len())
            .build()
            .user_data(token as u64);
        self.push(entry, token)
    }

    /// Submit a send of `buf`. The caller keeps `buf` alive until the
    /// request completes.
    pub fn submit_send(&mut self, fd: RawFd, buf: &[u8]) -> RequestState {
        let token = self.ops.insert(OpState::InFlight(OpKind::Send));
        let entry = opcode::Send::new(types::Fd(fd), buf.as_ptr(), buf.len() as u32)
            .build()
            .user_data(token as u64);
        self.push(entry, token)
    }

    /// Submit a receive into `buf`. The caller keeps `buf` alive until the
    /// request completes.
    pub fn submit_recv(&mut self, fd: RawFd, buf: &mut [u8]) -> RequestState {
        let token = self.ops.insert(OpState::InFlight(OpKind::Recv));
        let entry = opcode::Recv::new(types::Fd(fd), buf.as_mut_ptr(), buf.len() as u32)
            .build()
            .user_data(token as u64);
        self.push(entry, token)
    }

    /// Submit an asynchronous close of `fd`. On success the kernel owns the
    /// fd from here on.
    pub fn submit_close(&mut self, fd: RawFd) -> RequestState {
        let token = self.ops.insert(OpState::InFlight(OpKind::Close));
        let entry = opcode::Close::new(types::Fd(fd))
            .build()
            .user_data(token as u64);
        self.push(entry, token)
    }

    /// Submit one accept on the listener. The completion is delivered into
    /// `slot` during a progress step instead of through a pending request.
    pub fn submit_accept(&mut self, listener_fd: RawFd, slot: Arc<RequestSlot>) -> io::Result<()> {
        let token = self.ops.insert(OpState::InFlight(OpKind::Accept { slot }));
        let entry = opcode::Accept::new(types::Fd(listener_fd), ptr::null_mut(), ptr::null_mut())
            .build()
            .user_data(token as u64);

        let pushed = unsafe { self.ring.submission().push(&entry) };
        if pushed.is_err() {
            self.ops.remove(token);
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "submission queue full",
            ));
        }
        Ok(())
    }

    fn push(&mut self, entry: io_uring::squeue::Entry, token: usize) -> RequestState {
        let pushed = unsafe { self.ring.submission().push(&entry) };
        match pushed {
            Ok(()) => RequestState::Pending(PendingRequest(token as u64)),
            Err(_) => {
                self.ops.remove(token);
                RequestState::Failed(io::Error::new(
                    io::ErrorKind::Other,
                    "submission queue full",
                ))
            }
        }
    }
}

impl CompletionSource for Worker {
    fn step(&mut self) -> io::Result<usize> {
        self.progress()
    }

    fn poll_request(&mut self, request: &PendingRequest) -> Option<i32> {
        let token = request.0 as usize;
        if matches!(self.ops.get(token), Some(OpState::Done(_))) {
            if let OpState::Done(result) = self.ops.remove(token) {
                return Some(result);
            }
        }
        None
    }
}

/// Active communication handle representing one established connection.
///
/// Dropping an endpoint closes the socket synchronously; [`Endpoint::close`]
/// instead issues a forced asynchronous close driven by the worker.
#[derive(Debug)]
pub struct Endpoint {
    fd: OwnedFd,
}

impl Endpoint {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Build an endpoint by consuming a pending connection request.
    pub fn from_request(request: ConnRequest) -> Self {
        Self {
            fd: request.into_fd(),
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Issue a forced asynchronous close and wait on it. Consumes the
    /// endpoint, so the fd is released exactly once.
    pub fn close(self, worker: &mut Worker) -> Result<(), LinkError> {
        let raw = self.fd.into_raw_fd();
        let request = worker.submit_close(raw);
        if let RequestState::Failed(_) = &request {
            // The close never reached the ring; fall back to a synchronous
            // close so the fd does not leak.
            drop(unsafe { OwnedFd::from_raw_fd(raw) });
        }
        wait_on_request(worker, request)
            .map(|_| ())
            .map_err(LinkError::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_negotiates_capabilities() {
        Context::new(&EngineConfig::default()).unwrap();
    }

    #[test]
    fn test_progress_with_nothing_in_flight() {
        let context = Context::new(&EngineConfig::default()).unwrap();
        let mut worker = Worker::new(&context).unwrap();
        assert_eq!(worker.progress().unwrap(), 0);
    }

    #[test]
    fn test_close_of_invalid_fd_completes_with_error() {
        let context = Context::new(&EngineConfig::default()).unwrap();
        let mut worker = Worker::new(&context).unwrap();
        let request = worker.submit_close(-1);
        let err = wait_on_request(&mut worker, request).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }
}
