//! Production implementation of DatagramTransport using a tokio UDP socket.

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::transport::{DatagramTransport, Received};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// UDP transport bound to an ephemeral local port.
///
/// This is the "real" implementation used against a running race server.
/// Every receive is bounded by `recv_timeout`; datagrams are accepted from
/// any source, matching the server which may answer from another socket.
pub struct UdpTransport {
    socket: UdpSocket,

    /// Resolved race server address
    remote: SocketAddr,

    recv_timeout: Duration,

    max_datagram: usize,
}

impl UdpTransport {
    /// Resolves the configured endpoint and binds a local socket.
    pub async fn connect(config: TransportConfig) -> Result<Self, TransportError> {
        let endpoint = config.endpoint();
        let remote = tokio::net::lookup_host(&endpoint)
            .await
            .map_err(|e| TransportError::Resolve(format!("{endpoint}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::Resolve(endpoint.clone()))?;

        let local: SocketAddr = if remote.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        } else {
            SocketAddr::from(([0u8; 4], 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        Ok(Self {
            socket,
            remote,
            recv_timeout: config.recv_timeout,
            max_datagram: config.max_datagram,
        })
    }

    /// Returns the resolved remote address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Returns the local socket address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket
            .local_addr()
            .map_err(|e| TransportError::Bind(e.to_string()))
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        self.socket
            .send_to(payload.as_bytes(), self.remote)
            .await
            .map(|_| ())
            .map_err(TransportError::send)
    }

    async fn recv(&self) -> Result<Received, TransportError> {
        let mut buf = vec![0u8; self.max_datagram];
        match tokio::time::timeout(self.recv_timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _from))) => Ok(Received::Datagram(
                String::from_utf8_lossy(&buf[..len]).into_owned(),
            )),
            Ok(Err(e)) => Err(TransportError::recv(e)),
            Err(_elapsed) => Ok(Received::Timeout),
        }
    }

    fn peer(&self) -> String {
        self.remote.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fake_server() -> (UdpSocket, TransportConfig) {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        let config = TransportConfig::new("127.0.0.1", port)
            .with_recv_timeout(Duration::from_millis(50));
        (server, config)
    }

    #[tokio::test]
    async fn test_udp_send_and_receive() {
        let (server, config) = fake_server().await;
        let transport = UdpTransport::connect(config).await.unwrap();

        transport.send("SCR(init 0)").await.unwrap();

        let mut buf = [0u8; 64];
        let (len, client) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"SCR(init 0)");

        server.send_to(b"***identified***", client).await.unwrap();
        let received = transport.recv().await.unwrap();
        assert_eq!(received, Received::Datagram("***identified***".to_string()));
    }

    #[tokio::test]
    async fn test_udp_timeout_is_not_an_error() {
        let (_server, config) = fake_server().await;
        let transport = UdpTransport::connect(config).await.unwrap();

        let received = transport.recv().await.unwrap();
        assert_eq!(received, Received::Timeout);
        assert!(received.payload().is_none());
    }

    #[tokio::test]
    async fn test_udp_truncates_to_max_datagram() {
        let (server, config) = fake_server().await;
        let transport = UdpTransport::connect(config.with_max_datagram(4)).await.unwrap();
        transport.send("hi").await.unwrap();

        let mut buf = [0u8; 16];
        let (_, client) = server.recv_from(&mut buf).await.unwrap();
        server.send_to(b"(speedX 30)", client).await.unwrap();

        match transport.recv().await {
            Ok(Received::Datagram(text)) => assert_eq!(text, "(spe"),
            // Some platforms report an oversized datagram as an error instead
            Err(TransportError::Recv(_)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
