//! Connection establishment: active connect (client) and passive accept
//! (server) on top of the worker's completion loop.

use crate::error::LinkError;
use crate::harness::engine::{Endpoint, Worker};
use crate::harness::handoff::{ConnRequest, RequestSlot};
use crate::harness::waiter::wait_on_request;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::sync::Arc;
use tracing::info;

/// Passive handle accepting one incoming connection at a bound address.
///
/// Holds the bound socket and the hand-off slot its pending accept
/// completion writes into. Dropping the listener closes the socket.
#[derive(Debug)]
pub struct Listener {
    socket: TcpListener,
    slot: Arc<RequestSlot>,
}

impl Listener {
    pub fn slot(&self) -> Arc<RequestSlot> {
        Arc::clone(&self.slot)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Client path: build an endpoint against the remote address.
///
/// Internally asynchronous (the connect is driven to completion on the
/// worker before returning), but the caller sees either a live endpoint
/// or an error, with no separate completion to poll.
pub fn connect(worker: &mut Worker, addr: SocketAddr) -> Result<Endpoint, LinkError> {
    info!("Initializing endpoint");

    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket =
        Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(LinkError::Connect)?;
    socket.set_nonblocking(true).map_err(LinkError::Connect)?;

    // The kernel reads the address while the connect is in flight; `remote`
    // lives on this frame until the wait below returns.
    let remote = SockAddr::from(addr);
    let request = worker.submit_connect(socket.as_raw_fd(), &remote);
    wait_on_request(worker, request).map_err(LinkError::Connect)?;

    info!("Endpoint initialized");
    let stream: std::net::TcpStream = socket.into();
    Ok(Endpoint::new(OwnedFd::from(stream)))
}

/// Server path, step one: bind a listener and arm a single accept whose
/// completion lands in the listener's hand-off slot.
pub fn listen(worker: &mut Worker, addr: SocketAddr, backlog: i32) -> Result<Listener, LinkError> {
    info!("Initializing listener");

    let socket = create_listener(addr, backlog).map_err(LinkError::Accept)?;
    let slot = Arc::new(RequestSlot::new());
    worker
        .submit_accept(socket.as_raw_fd(), Arc::clone(&slot))
        .map_err(LinkError::Accept)?;

    let listener = Listener { socket, slot };
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "Listener bound");
    }
    Ok(listener)
}

/// Server path, step two: progress the worker until a connection request
/// is captured, then consume it into an endpoint.
///
/// There is no timeout; a peer that never connects leaves this loop
/// spinning. Bounding the wait is the caller's concern.
pub fn await_connection(worker: &mut Worker, slot: &RequestSlot) -> Result<Endpoint, LinkError> {
    info!("Waiting on client connection");
    while slot.is_empty() {
        worker.progress().map_err(LinkError::Accept)?;
    }

    // Sole consumer of the slot; the request cannot vanish between the
    // check above and this take.
    let raw = slot.take().ok_or_else(|| {
        LinkError::Accept(io::Error::new(
            io::ErrorKind::Other,
            "connection request slot was empty",
        ))
    })?;

    if raw < 0 {
        return Err(LinkError::Accept(io::Error::from_raw_os_error(-raw)));
    }

    info!("Accepting client connection");
    Ok(Endpoint::from_request(ConnRequest::from_accepted(raw)))
}

/// Bind a TCP listener with SO_REUSEADDR so a fresh run can rebind the
/// address right after a previous teardown released it.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::engine::{Context, EngineConfig};

    #[test]
    fn test_listener_socket_binds_ephemeral_port() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = create_listener(addr, 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_listener_address_is_reusable_after_drop() {
        let addr: SocketAddr = "127.0.0.1:29983".parse().unwrap();
        let first = create_listener(addr, 16).unwrap();
        drop(first);
        create_listener(addr, 16).unwrap();
    }

    #[test]
    fn test_listen_reports_bound_address() {
        let context = Context::new(&EngineConfig::default()).unwrap();
        let mut worker = Worker::new(&context).unwrap();
        let listener = listen(&mut worker, "127.0.0.1:0".parse().unwrap(), 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
