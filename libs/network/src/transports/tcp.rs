//! TCP transport
//!
//! Client connects with a timeout and `TCP_NODELAY`; the acceptor binds once
//! and hands out one stream per inbound connection.

use super::{Acceptor, BoxedStream, Connector, Endpoint};
use crate::{Result, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Opens TCP client streams
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxedStream> {
        let Endpoint::Tcp { host, port } = endpoint else {
            return Err(TransportError::configuration(
                format!("{endpoint} is not a TCP endpoint"),
                Some("host"),
            ));
        };
        let remote = endpoint.to_string();
        debug!(remote = %remote, "Connecting to TCP peer");

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port)))
            .await
            .map_err(|_| TransportError::timeout("TCP connect", timeout.as_millis() as u64))?
            .map_err(|e| {
                TransportError::connection_with_source("Failed to connect", Some(&remote), e)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        info!(remote = %remote, "Connected to TCP peer");
        Ok(Box::new(stream))
    }
}

/// Listening TCP socket
pub struct TcpAcceptor {
    listener: TcpListener,
    local: Endpoint,
}

impl TcpAcceptor {
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| TransportError::network_with_source("Failed to bind TCP listener", e))?;
        let bound = listener
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to read bound address", e))?;
        let local = Endpoint::tcp(host, bound.port());
        info!(local = %local, "TCP server listening");
        Ok(Self { listener, local })
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<(BoxedStream, String)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to accept TCP connection", e))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }
        debug!(peer = %peer, "Accepted TCP connection");
        Ok((Box::new(stream), peer.to_string()))
    }

    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn loopback_connect_and_accept() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1", 0).await.unwrap();
        let endpoint = acceptor.local_endpoint();
        assert!(matches!(endpoint, Endpoint::Tcp { port, .. } if port != 0));

        let server = tokio::spawn(async move {
            let (mut stream, _) = acceptor.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut client = TcpConnector
            .connect(&endpoint, Duration::from_secs(1))
            .await
            .unwrap();
        client.write_all(b"ping").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn rejects_memory_endpoint() {
        let err = TcpConnector
            .connect(&Endpoint::memory("x"), Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert_eq!(err.category(), "configuration");
    }
}
