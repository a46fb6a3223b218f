//! Error types for the transport layer.

use thiserror::Error;

/// Errors that can occur at the socket layer.
///
/// A receive timeout is deliberately absent: it is a routine outcome
/// reported through [`crate::Received::Timeout`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote endpoint could not be resolved to a socket address
    #[error("Cannot resolve {0}")]
    Resolve(String),

    /// The local socket could not be created or bound
    #[error("Bind error: {0}")]
    Bind(String),

    /// Datagram send failed (unreachable, payload too large, etc.)
    #[error("Send error: {0}")]
    Send(String),

    /// Datagram receive failed for a reason other than a timeout
    #[error("Receive error: {0}")]
    Recv(String),

    /// The peer side of an in-process transport went away
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// Creates a send error.
    pub fn send(msg: impl std::fmt::Display) -> Self {
        Self::Send(msg.to_string())
    }

    /// Creates a receive error.
    pub fn recv(msg: impl std::fmt::Display) -> Self {
        Self::Recv(msg.to_string())
    }
}
