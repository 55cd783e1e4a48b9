//! In-memory transport
//!
//! Named endpoints backed by `tokio::io::duplex`. A registry is an explicit
//! object shared by the connecting and listening sides; two registries never
//! see each other's endpoints.

use super::{Acceptor, BoxedStream, Connector, Endpoint};
use crate::{Result, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Per-direction buffer of each in-memory stream
const DUPLEX_CAPACITY: usize = 256 * 1024;

type Pending = (DuplexStream, String);

/// Named in-memory endpoints
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Pending>>>>,
    next_client: Arc<AtomicU64>,
}

impl fmt::Debug for MemoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut endpoints: Vec<String> = self.listeners.lock().keys().cloned().collect();
        endpoints.sort();
        f.debug_struct("MemoryRegistry")
            .field("endpoints", &endpoints)
            .finish()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening on `name`
    pub fn bind(&self, name: &str) -> Result<MemoryAcceptor> {
        let mut listeners = self.listeners.lock();
        if listeners.get(name).is_some_and(|tx| !tx.is_closed()) {
            return Err(TransportError::configuration(
                format!("memory endpoint '{name}' is already bound"),
                Some("port"),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        listeners.insert(name.to_string(), tx);
        debug!(name, "Memory endpoint bound");
        Ok(MemoryAcceptor {
            name: name.to_string(),
            incoming: rx,
            registry: self.clone(),
        })
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.listeners
            .lock()
            .get(name)
            .is_some_and(|tx| !tx.is_closed())
    }

    fn unbind(&self, name: &str) {
        let mut listeners = self.listeners.lock();
        if listeners.get(name).is_some_and(|tx| tx.is_closed()) {
            listeners.remove(name);
        }
    }
}

#[async_trait]
impl Connector for MemoryRegistry {
    async fn connect(&self, endpoint: &Endpoint, _timeout: Duration) -> Result<BoxedStream> {
        let Endpoint::Memory { name } = endpoint else {
            return Err(TransportError::configuration(
                format!("{endpoint} is not a memory endpoint"),
                Some("host"),
            ));
        };
        let sender = self.listeners.lock().get(name).cloned().ok_or_else(|| {
            TransportError::connection("connection refused", Some(&endpoint.to_string()))
        })?;
        let peer = format!(
            "memory-client-{}",
            self.next_client.fetch_add(1, Ordering::Relaxed) + 1
        );
        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        sender.send((server, peer)).map_err(|_| {
            TransportError::connection("connection refused", Some(&endpoint.to_string()))
        })?;
        Ok(Box::new(client))
    }
}

/// Listening side of a memory endpoint; unbinds on drop
pub struct MemoryAcceptor {
    name: String,
    incoming: mpsc::UnboundedReceiver<Pending>,
    registry: MemoryRegistry,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Result<(BoxedStream, String)> {
        let (stream, peer) = self
            .incoming
            .recv()
            .await
            .ok_or_else(|| TransportError::channel_closed("memory listener closed"))?;
        Ok((Box::new(stream), peer))
    }

    fn local_endpoint(&self) -> Endpoint {
        Endpoint::memory(self.name.clone())
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        self.incoming.close();
        self.registry.unbind(&self.name);
    }
}
