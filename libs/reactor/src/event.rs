//! Events handed from the reactor to the dispatcher, and channel snapshots

use network::{ChannelId, MetricsSnapshot, PoolStats};
use std::fmt;
use std::time::Duration;
use types::Msg;

/// Connection lifecycle of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Connecting or running the handshake
    Initializing,
    /// Handshake done, message traffic flowing
    Up,
    /// The stream layer above finished its login and directory exchange
    Ready,
    /// Connection lost, waiting for the next attempt
    DownReconnecting,
    /// Connection lost and no further attempt will be made
    Down,
    /// Closed locally
    Closed,
}

impl ChannelState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Up | Self::Ready)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Initializing => "Initializing",
            Self::Up => "Up",
            Self::Ready => "Ready",
            Self::DownReconnecting => "DownReconnecting",
            Self::Down => "Down",
            Self::Closed => "Closed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Outbound channel with a host list
    Client,
    /// Accepted by a listening server
    Server,
}

/// Point-in-time view of a channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub channel: ChannelId,
    pub name: String,
    pub role: ChannelRole,
    pub state: ChannelState,
    /// Remote address of the live connection
    pub host: Option<String>,
    pub peer_component: Option<String>,
    pub ping_timeout: Option<Duration>,
    /// Frames are never compressed; the configured threshold is reported as set
    pub compression_threshold: usize,
    pub buffers: PoolStats,
    pub metrics: MetricsSnapshot,
}

/// Something the dispatcher must hand to the stream layer
#[derive(Debug, Clone, PartialEq)]
pub enum ReactorEvent {
    /// Handshake completed on `channel`
    ChannelUp { channel: ChannelId, host: String },
    /// Connection lost; `reconnecting` tells whether another attempt follows
    ChannelDown {
        channel: ChannelId,
        reconnecting: bool,
        reason: String,
    },
    /// A decoded inbound message
    Message { channel: ChannelId, msg: Msg },
}

impl ReactorEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::ChannelUp { channel, .. }
            | Self::ChannelDown { channel, .. }
            | Self::Message { channel, .. } => *channel,
        }
    }
}
