//! Datagram transport abstraction for the racing client.

use async_trait::async_trait;
use crate::error::TransportError;

/// Outcome of a bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A datagram arrived within the receive window
    Datagram(String),

    /// Nothing arrived before the receive window closed
    Timeout,
}

impl Received {
    /// Returns the payload text, if any.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Received::Datagram(text) => Some(text),
            Received::Timeout => None,
        }
    }
}

/// Abstraction for text datagram I/O with a single fixed remote endpoint.
///
/// # Implementations
///
/// - **Production**: [`crate::UdpTransport`] wraps a tokio UDP socket
/// - **Simulation**: `scrc_sim::SimServer` answers in-process, deterministically
///
/// # Exchange
///
/// ```text
/// Client                     Transport                    Server
///   |                           |                           |
///   |-- send(text) ------------>|-- datagram -------------->|
///   |                           |<------------- datagram ---|
///   |-- recv() -> Datagram <----|                           |
///   |-- recv() -> Timeout  <----| (window elapsed)          |
/// ```
#[async_trait]
pub trait DatagramTransport: Send + Sync + 'static {
    /// Sends a text payload to the remote endpoint.
    ///
    /// # Returns
    /// * `Ok(())` - Datagram handed to the network
    /// * `Err(TransportError::Send)` - Immediate send failure
    ///
    /// # Note
    /// Success does not guarantee delivery.
    async fn send(&self, payload: &str) -> Result<(), TransportError>;

    /// Waits up to the configured receive window for the next payload.
    ///
    /// # Returns
    /// * `Ok(Received::Datagram(text))` - A payload arrived
    /// * `Ok(Received::Timeout)` - The window elapsed without a payload
    /// * `Err(TransportError::Recv)` - Socket-level failure
    async fn recv(&self) -> Result<Received, TransportError>;

    /// Human readable description of the remote endpoint (for logging).
    fn peer(&self) -> String;
}

#[async_trait]
impl<T: DatagramTransport> DatagramTransport for std::sync::Arc<T> {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        (**self).send(payload).await
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        (**self).recv().await
    }

    fn peer(&self) -> String {
        (**self).peer()
    }
}
