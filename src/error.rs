//! Error taxonomy for the connection harness.
//!
//! Each variant names the lifecycle step that failed and wraps the
//! underlying I/O error. Every fallible step returns its error to its
//! immediate caller; only the teardown path logs instead of propagating.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum LinkError {
    /// Reading or negotiating the engine's default configuration failed.
    Config(io::Error),
    /// Context or worker creation failed.
    Init(io::Error),
    /// Client-side endpoint creation failed.
    Connect(io::Error),
    /// Server-side listener or endpoint creation failed.
    Accept(io::Error),
    /// A send or receive request failed or completed with an error status.
    Io(io::Error),
    /// Force-closing the endpoint failed. Logged during teardown, never
    /// fatal to it.
    Close(io::Error),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Config(e) => write!(f, "Reading engine configuration failed: {}", e),
            LinkError::Init(e) => write!(f, "Initializing transport resources failed: {}", e),
            LinkError::Connect(e) => write!(f, "Creating endpoint failed: {}", e),
            LinkError::Accept(e) => write!(f, "Accepting connection failed: {}", e),
            LinkError::Io(e) => write!(f, "Transfer request failed: {}", e),
            LinkError::Close(e) => write!(f, "Force-closing endpoint failed: {}", e),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Config(e)
            | LinkError::Init(e)
            | LinkError::Connect(e)
            | LinkError::Accept(e)
            | LinkError::Io(e)
            | LinkError::Close(e) => Some(e),
        }
    }
}
