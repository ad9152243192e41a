//! Single-message exchange plugged in on top of the lifecycle core.
//!
//! The wire format is a null-terminated text message with no length
//! prefix; the receive side relies on a fixed oversized buffer. Longer
//! messages truncate at the buffer boundary.

use crate::error::LinkError;
use crate::harness::{wait_on_request, ConnectionHook, Endpoint, Worker};
use std::io;
use tracing::info;

/// Exact bytes on the wire, trailing NUL included.
const GREETING: &[u8] = b"Hello UCX\0";

/// Fixed receive buffer size.
const RECV_BUFFER_SIZE: usize = 32;

/// One-shot greeting exchange: the client sends [`GREETING`], the server
/// receives it into a fixed 32-byte buffer.
#[derive(Debug, Default)]
pub struct Messaging {
    received: Option<Vec<u8>>,
}

impl Messaging {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload captured by the last server-side exchange.
    #[allow(dead_code)] // read by tests
    pub fn received(&self) -> Option<&[u8]> {
        self.received.as_deref()
    }
}

impl ConnectionHook for Messaging {
    fn on_client_ready(
        &mut self,
        worker: &mut Worker,
        endpoint: &Endpoint,
    ) -> Result<(), LinkError> {
        // GREETING is 'static, so it outlives the in-flight send.
        let request = worker.submit_send(endpoint.raw_fd(), GREETING);
        let sent = wait_on_request(worker, request).map_err(LinkError::Io)? as usize;
        if sent != GREETING.len() {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {} of {} bytes", sent, GREETING.len()),
            )));
        }

        info!("Message sent");
        Ok(())
    }

    fn on_server_ready(
        &mut self,
        worker: &mut Worker,
        endpoint: &Endpoint,
    ) -> Result<(), LinkError> {
        // The buffer stays on this frame until the wait returns, so the
        // kernel's writes land in live memory.
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        let request = worker.submit_recv(endpoint.raw_fd(), &mut buffer);
        let received = wait_on_request(worker, request).map_err(LinkError::Io)? as usize;
        if received == 0 {
            return Err(LinkError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "peer closed before sending a message",
            )));
        }

        let text_end = buffer[..received]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(received);
        info!(
            message = %String::from_utf8_lossy(&buffer[..text_end]),
            "Received message"
        );

        self.received = Some(buffer[..received].to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_is_null_terminated_and_fits_the_buffer() {
        assert_eq!(GREETING.len(), 10);
        assert_eq!(GREETING.last(), Some(&0));
        assert!(GREETING.len() <= RECV_BUFFER_SIZE);
    }
}
