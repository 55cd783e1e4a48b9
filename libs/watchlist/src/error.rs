//! Watchlist errors
//!
//! Everything here is a synchronous misuse reported at the offending call.
//! Asynchronous stream failures travel as status messages instead.

use crate::handle::Handle;
use codec::CodecError;
use thiserror::Error;
use types::ValidationError;

pub type Result<T> = std::result::Result<T, WatchlistError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WatchlistError {
    /// Handle was never issued or has been retired
    #[error("Handle {handle} is not valid")]
    InvalidHandle { handle: Handle },

    /// Call not allowed in the current stream or instance state
    #[error("Invalid usage: {message}")]
    InvalidUsage { message: String },

    /// Domain type the operation does not support
    #[error("Domain type {domain} is not supported by {operation}")]
    UnsupportedDomain { domain: u16, operation: &'static str },

    /// Message failed construction-time validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Payload the watchlist generates could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Instance is shutting down or shut down
    #[error("Watchlist is shut down")]
    Shutdown,
}

impl WatchlistError {
    pub fn invalid_handle(handle: Handle) -> Self {
        Self::InvalidHandle { handle }
    }

    pub fn invalid_usage(message: impl Into<String>) -> Self {
        Self::InvalidUsage {
            message: message.into(),
        }
    }

    pub fn unsupported_domain(domain: impl Into<u16>, operation: &'static str) -> Self {
        Self::UnsupportedDomain {
            domain: domain.into(),
            operation,
        }
    }
}
