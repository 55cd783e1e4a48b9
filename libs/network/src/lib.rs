//! # Network Transport
//!
//! ## Purpose
//!
//! Moves encoded messages between two processes:
//! - Length-prefixed frames with ping frames and an optional CRC32 trailer
//! - Connection handshake negotiating ping timeout and checksum
//! - TCP and in-memory transports behind [`Connector`] / [`Acceptor`]
//! - Output buffer pools that bound in-flight messages per channel
//! - IOCtl codes for changing a live channel and the reconnect backoff policy
//!
//! ## Architecture Role
//!
//! ```text
//! codec → [network] → reactor
//!   ↓         ↓          ↓
//! Bytes   Frames,     Channel tasks,
//!         Handshake,  failover,
//!         Pools       dispatch
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Message encoding (belongs in codec/)
//! - Reconnect loops, ping scheduling or event dispatch (belongs in reactor/)

pub mod backoff;
pub mod channel;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod ioctl;
pub mod transports;

pub use backoff::{Backoff, BackoffPolicy};
pub use channel::{
    accept_server, open_client, ChannelId, ChannelReader, ChannelWriter, EstablishedChannel,
};
pub use error::{Result, TransportError};
pub use framing::{Frame, FrameCodec, FrameReader, FrameWriter, DEFAULT_MAX_FRAME_SIZE};
pub use handshake::{ConnectRequest, Negotiated, ServerPolicy, PROTOCOL_VERSION};
pub use ioctl::{ChannelSettings, IoctlCode};
pub use transports::{
    Acceptor, Backpressure, BoxedStream, BufferPool, ChannelMetrics, Connector, Endpoint,
    EndpointConnector, MemoryRegistry, MetricsSnapshot, PoolBuffer, PoolStats, SharedBufferPool,
    TcpAcceptor, TcpConnector,
};

/// Default ping timeout offered in the handshake
pub const DEFAULT_PING_TIMEOUT_SECS: u64 = 30;
/// Default connect and handshake timeout
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
