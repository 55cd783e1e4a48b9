//! Listening side for interactive providers
//!
//! A server owns the shared buffer pool its accepted channels borrow from
//! and a template pool holding the guaranteed/max counts new channels start
//! with. Every accepted connection becomes its own channel id and lives until
//! the client goes away; there is no reconnect on this side.

use crate::channel::{ChannelShared, Command};
use crate::connection::{self, Ended, Link};
use crate::event::{ChannelRole, ChannelState, ReactorEvent};
use crate::registry::Registry;
use codec::Decoder;
use network::{
    accept_server, Acceptor, Backpressure, BoxedStream, BufferPool, ChannelSettings, Endpoint,
    EstablishedChannel, ServerPolicy, SharedBufferPool,
};
use omm_config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub(crate) struct ServerShared {
    pub name: String,
    pub endpoint: Endpoint,
    pub shared_pool: SharedBufferPool,
    /// Guaranteed/max counts for channels accepted from now on
    pub template: BufferPool,
    /// Writer settings shared by every accepted channel
    pub settings: ChannelSettings,
    pub backpressure: Backpressure,
    pub policy: ServerPolicy,
    pub max_frame_size: usize,
}

impl ServerShared {
    pub fn new(config: &ServerConfig, endpoint: Endpoint, component_name: String, max_frame_size: usize) -> Self {
        let tuning = &config.tuning;
        Self {
            name: config.name.clone(),
            endpoint,
            shared_pool: SharedBufferPool::new(config.shared_pool_buffers),
            template: BufferPool::new(
                format!("{} template", config.name),
                tuning.guaranteed_output_buffers,
                tuning.max_output_buffers,
            ),
            settings: tuning.settings(),
            backpressure: tuning.backpressure(),
            policy: ServerPolicy {
                ping_timeout: tuning.ping_timeout(),
                component_name,
                allow_checksum: config.allow_checksum,
                timeout: config.handshake_timeout(),
            },
            max_frame_size,
        }
    }
}

/// Accept until shutdown
pub(crate) async fn serve(
    mut acceptor: Box<dyn Acceptor>,
    server: Arc<ServerShared>,
    registry: Arc<Registry>,
    decoder: Decoder,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(server = %server.name, endpoint = %server.endpoint, "Listening");
    loop {
        tokio::select! {
            accepted = acceptor.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_client(
                        stream,
                        peer,
                        Arc::clone(&server),
                        Arc::clone(&registry),
                        decoder,
                    ));
                }
                Err(error) => {
                    warn!(server = %server.name, %error, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    info!(server = %server.name, "Stopped listening");
}

async fn serve_client(
    stream: BoxedStream,
    peer: String,
    server: Arc<ServerShared>,
    registry: Arc<Registry>,
    decoder: Decoder,
) {
    let established = match accept_server(stream, peer.clone(), &server.policy, server.max_frame_size).await {
        Ok(established) => established,
        Err(error) => {
            warn!(server = %server.name, %peer, %error, "Handshake failed");
            return;
        }
    };
    let EstablishedChannel {
        mut reader,
        writer,
        negotiated,
        remote,
    } = established;

    let id = registry.allocate_id();
    let limits = server.template.stats();
    let pool = BufferPool::with_shared(
        format!("{}/{}", server.name, remote),
        limits.guaranteed,
        limits.max,
        server.shared_pool.clone(),
    );
    let (shared, mut commands) = ChannelShared::new(
        id,
        format!("{}/{}", server.name, remote),
        ChannelRole::Server,
        pool,
        server.settings.clone(),
        server.backpressure,
    );
    let shared = Arc::new(shared);
    let ping_timeout = negotiated.ping_timeout;
    registry.insert(Arc::clone(&shared));
    shared.attach(writer, remote.clone(), negotiated).await;
    let _ = registry.events.send(ReactorEvent::ChannelUp {
        channel: id,
        host: remote,
    });

    let reason = loop {
        let link = Link {
            shared: &shared,
            reader: &mut reader,
            events: &registry.events,
            decoder: &decoder,
            ping_timeout,
        };
        match connection::run(link, &mut commands, None).await {
            Ended::Lost(reason) => break reason,
            Ended::Command(Command::Close) => break "channel closed".to_string(),
            // Preferred host has no meaning for an accepted channel
            Ended::Command(Command::FallbackToPreferred(_)) | Ended::Detect => {}
        }
    };
    info!(channel = %shared.name, %reason, "Client channel down");
    shared.detach(ChannelState::Closed).await;
    registry.remove(id);
    let _ = registry.events.send(ReactorEvent::ChannelDown {
        channel: id,
        reconnecting: false,
        reason,
    });
}
