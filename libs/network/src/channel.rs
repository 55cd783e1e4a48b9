//! Established channels
//!
//! A channel is a byte stream that completed the handshake, split into a
//! framed reader and a framed writer configured with the negotiated checksum.

use crate::framing::{FrameCodec, FrameReader, FrameWriter};
use crate::handshake::{client_handshake, server_handshake, ConnectRequest, Negotiated, ServerPolicy};
use crate::transports::{BoxedStream, Connector, Endpoint};
use crate::Result;
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tracing::info;

/// Identity of one logical channel for its whole life, across reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

pub type ChannelReader = FrameReader<ReadHalf<BoxedStream>>;
pub type ChannelWriter = FrameWriter<WriteHalf<BoxedStream>>;

/// A channel ready for message traffic
pub struct EstablishedChannel {
    pub reader: ChannelReader,
    pub writer: ChannelWriter,
    pub negotiated: Negotiated,
    /// Printable remote address
    pub remote: String,
}

impl std::fmt::Debug for EstablishedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedChannel")
            .field("remote", &self.remote)
            .field("negotiated", &self.negotiated)
            .finish()
    }
}

fn split(
    stream: BoxedStream,
    negotiated: Negotiated,
    remote: String,
    max_frame_size: usize,
) -> EstablishedChannel {
    let codec = FrameCodec::new(negotiated.checksum, max_frame_size);
    let (read, write) = tokio::io::split(stream);
    EstablishedChannel {
        reader: FrameReader::new(read, codec),
        writer: FrameWriter::new(write, codec),
        negotiated,
        remote,
    }
}

/// Connect to `endpoint` and run the client handshake
pub async fn open_client(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    request: &ConnectRequest,
    connect_timeout: Duration,
    max_frame_size: usize,
) -> Result<EstablishedChannel> {
    let mut stream = connector.connect(endpoint, connect_timeout).await?;
    let remote = endpoint.to_string();
    let negotiated = client_handshake(&mut stream, request, &remote, connect_timeout).await?;
    info!(remote = %remote, "Channel established");
    Ok(split(stream, negotiated, remote, max_frame_size))
}

/// Run the server handshake on an accepted stream
pub async fn accept_server(
    mut stream: BoxedStream,
    peer: String,
    policy: &ServerPolicy,
    max_frame_size: usize,
) -> Result<EstablishedChannel> {
    let negotiated = server_handshake(&mut stream, policy, &peer).await?;
    info!(peer = %peer, client = %negotiated.peer_component, "Client channel established");
    Ok(split(stream, negotiated, peer, max_frame_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{Frame, DEFAULT_MAX_FRAME_SIZE};
    use crate::handshake::PROTOCOL_VERSION;
    use crate::transports::{Acceptor, MemoryRegistry};
    use bytes::Bytes;

    #[tokio::test]
    async fn client_and_server_exchange_checksummed_frames() {
        let registry = MemoryRegistry::new();
        let mut acceptor = registry.bind("provider").unwrap();
        let policy = ServerPolicy {
            ping_timeout: Duration::from_secs(60),
            component_name: "provider".into(),
            allow_checksum: true,
            timeout: Duration::from_secs(1),
        };
        let server = tokio::spawn(async move {
            let (stream, peer) = acceptor.accept().await.unwrap();
            let mut channel = accept_server(stream, peer, &policy, DEFAULT_MAX_FRAME_SIZE)
                .await
                .unwrap();
            let frame = channel.reader.next_frame().await.unwrap();
            channel.writer.send(b"refresh").await.unwrap();
            frame
        });

        let request = ConnectRequest {
            protocol_version: PROTOCOL_VERSION,
            ping_timeout: Duration::from_secs(30),
            component_name: "consumer".into(),
            checksum: true,
        };
        let mut channel = open_client(
            &registry,
            &Endpoint::memory("provider"),
            &request,
            Duration::from_secs(1),
            DEFAULT_MAX_FRAME_SIZE,
        )
        .await
        .unwrap();
        assert!(channel.negotiated.checksum);
        assert_eq!(channel.remote, "memory://provider");

        channel.writer.send(b"request").await.unwrap();
        assert_eq!(
            channel.reader.next_frame().await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"refresh")))
        );
        assert_eq!(
            server.await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"request")))
        );
    }
}
