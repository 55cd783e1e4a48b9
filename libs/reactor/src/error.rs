//! Reactor error types

use codec::CodecError;
use network::{ChannelId, TransportError};
use omm_config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReactorError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown channel {channel}")]
    UnknownChannel { channel: ChannelId },

    /// The channel exists but has no live connection right now
    #[error("Channel {name} is not connected")]
    ChannelDown { name: String },

    #[error("IOCtl {code} rejected: {message}")]
    Ioctl { code: i32, message: String },

    #[error("Runtime error: {message}")]
    Runtime { message: String },

    #[error("Reactor is shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, ReactorError>;

impl ReactorError {
    pub fn channel_down(name: impl Into<String>) -> Self {
        Self::ChannelDown { name: name.into() }
    }

    pub fn ioctl(code: i32, message: impl Into<String>) -> Self {
        Self::Ioctl {
            code,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Output buffers exhausted under reject mode or a bounded block
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::ResourceExhausted { .. })
        )
    }
}
