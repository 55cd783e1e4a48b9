//! Connection establishment
//!
//! A channel runs over any bidirectional byte stream. [`Connector`] opens
//! client streams and [`Acceptor`] yields server streams; TCP is the production
//! transport and the in-memory transport gives tests a hermetic loopback.

use crate::{Result, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod memory;
pub mod metrics;
pub mod pool;
pub mod tcp;

pub use memory::{MemoryAcceptor, MemoryRegistry};
pub use metrics::{ChannelMetrics, MetricsSnapshot};
pub use pool::{Backpressure, BufferPool, PoolBuffer, PoolStats, SharedBufferPool};
pub use tcp::{TcpAcceptor, TcpConnector};

/// Prefix selecting the in-memory transport in an endpoint string
pub const MEMORY_SCHEME: &str = "memory://";

/// Anything a channel can run over
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ByteStream for T {}

pub type BoxedStream = Box<dyn ByteStream>;

/// Where a channel connects or listens
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Memory { name: String },
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Endpoint::Memory { name: name.into() }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Memory { name } => write!(f, "{MEMORY_SCHEME}{name}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self> {
        if let Some(name) = value.strip_prefix(MEMORY_SCHEME) {
            if name.is_empty() {
                return Err(TransportError::configuration(
                    "memory endpoint needs a name",
                    Some("host"),
                ));
            }
            return Ok(Endpoint::memory(name));
        }
        let (host, port) = value.rsplit_once(':').ok_or_else(|| {
            TransportError::configuration(format!("'{value}' is not host:port"), Some("host"))
        })?;
        if host.is_empty() {
            return Err(TransportError::configuration(
                format!("'{value}' has an empty host"),
                Some("host"),
            ));
        }
        let port = port.parse::<u16>().map_err(|_| {
            TransportError::configuration(format!("'{value}' has an invalid port"), Some("port"))
        })?;
        Ok(Endpoint::tcp(host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = TransportError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

/// Opens client streams
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxedStream>;
}

/// Yields accepted server streams
#[async_trait]
pub trait Acceptor: Send {
    /// Next inbound stream and a printable peer address
    async fn accept(&mut self) -> Result<(BoxedStream, String)>;

    /// Endpoint actually bound (the real port when 0 was requested)
    fn local_endpoint(&self) -> Endpoint;
}

/// Connector for both transports
///
/// TCP endpoints go to the network; memory endpoints are resolved in the
/// registry this connector was built with.
#[derive(Clone, Default)]
pub struct EndpointConnector {
    tcp: TcpConnector,
    memory: MemoryRegistry,
}

impl EndpointConnector {
    pub fn new(memory: MemoryRegistry) -> Self {
        Self {
            tcp: TcpConnector,
            memory,
        }
    }

    pub fn memory_registry(&self) -> &MemoryRegistry {
        &self.memory
    }

    /// Listen on `endpoint` with the matching transport
    pub async fn bind(&self, endpoint: &Endpoint) -> Result<Box<dyn Acceptor>> {
        match endpoint {
            Endpoint::Tcp { host, port } => Ok(Box::new(TcpAcceptor::bind(host, *port).await?)),
            Endpoint::Memory { name } => Ok(Box::new(self.memory.bind(name)?)),
        }
    }
}

#[async_trait]
impl Connector for EndpointConnector {
    async fn connect(&self, endpoint: &Endpoint, timeout: Duration) -> Result<BoxedStream> {
        match endpoint {
            Endpoint::Tcp { .. } => self.tcp.connect(endpoint, timeout).await,
            Endpoint::Memory { .. } => self.memory.connect(endpoint, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_parse_and_print() {
        let tcp: Endpoint = "localhost:14002".parse().unwrap();
        assert_eq!(tcp, Endpoint::tcp("localhost", 14002));
        assert_eq!(tcp.to_string(), "localhost:14002");

        let memory: Endpoint = "memory://provider".parse().unwrap();
        assert_eq!(memory, Endpoint::memory("provider"));
        assert_eq!(memory.to_string(), "memory://provider");

        assert!("localhost".parse::<Endpoint>().is_err());
        assert!(":14002".parse::<Endpoint>().is_err());
        assert!("host:99999".parse::<Endpoint>().is_err());
        assert!("memory://".parse::<Endpoint>().is_err());
    }
}
