//! Application-facing errors
//!
//! Every failure an application can see is one [`OmmError`] variant carrying
//! a payload for its kind. Callers branch on [`OmmError::kind`] rather than on
//! the layer the error came from.

use codec::CodecError;
use omm_config::ConfigError;
use reactor::ReactorError;
use std::fmt;
use thiserror::Error;
use types::ValidationError;
use watchlist::{Handle, WatchlistError};

pub type Result<T> = std::result::Result<T, OmmError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OmmErrorKind {
    InvalidUsage,
    MemoryExhaustion,
    UnsupportedDomainType,
    InvalidHandle,
    Shutdown,
}

impl fmt::Display for OmmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InvalidUsage => "InvalidUsage",
            Self::MemoryExhaustion => "MemoryExhaustion",
            Self::UnsupportedDomainType => "UnsupportedDomainType",
            Self::InvalidHandle => "InvalidHandle",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(text)
    }
}

/// Bad call sequence or argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUsage {
    pub text: String,
}

/// Output buffers or another bounded resource ran out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryExhaustion {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedDomainType {
    pub domain: u16,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHandle {
    pub handle: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shutdown {
    pub text: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OmmError {
    #[error("Invalid usage: {}", .0.text)]
    InvalidUsage(InvalidUsage),

    #[error("Memory exhaustion: {}", .0.text)]
    MemoryExhaustion(MemoryExhaustion),

    #[error("Unsupported domain type {}: {}", .0.domain, .0.text)]
    UnsupportedDomainType(UnsupportedDomainType),

    #[error("Invalid handle {}: {}", .0.handle, .0.text)]
    InvalidHandle(InvalidHandle),

    #[error("Shut down: {}", .0.text)]
    Shutdown(Shutdown),
}

impl OmmError {
    pub fn invalid_usage(text: impl Into<String>) -> Self {
        Self::InvalidUsage(InvalidUsage { text: text.into() })
    }

    pub fn memory_exhaustion(text: impl Into<String>) -> Self {
        Self::MemoryExhaustion(MemoryExhaustion { text: text.into() })
    }

    pub fn unsupported_domain(domain: u16, text: impl Into<String>) -> Self {
        Self::UnsupportedDomainType(UnsupportedDomainType {
            domain,
            text: text.into(),
        })
    }

    pub fn invalid_handle(handle: u64, text: impl Into<String>) -> Self {
        Self::InvalidHandle(InvalidHandle {
            handle,
            text: text.into(),
        })
    }

    pub fn shutdown(text: impl Into<String>) -> Self {
        Self::Shutdown(Shutdown { text: text.into() })
    }

    pub fn kind(&self) -> OmmErrorKind {
        match self {
            Self::InvalidUsage(_) => OmmErrorKind::InvalidUsage,
            Self::MemoryExhaustion(_) => OmmErrorKind::MemoryExhaustion,
            Self::UnsupportedDomainType(_) => OmmErrorKind::UnsupportedDomainType,
            Self::InvalidHandle(_) => OmmErrorKind::InvalidHandle,
            Self::Shutdown(_) => OmmErrorKind::Shutdown,
        }
    }

    /// Human-readable explanation without the kind prefix
    pub fn text(&self) -> &str {
        match self {
            Self::InvalidUsage(e) => &e.text,
            Self::MemoryExhaustion(e) => &e.text,
            Self::UnsupportedDomainType(e) => &e.text,
            Self::InvalidHandle(e) => &e.text,
            Self::Shutdown(e) => &e.text,
        }
    }
}

impl From<ValidationError> for OmmError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::DomainTypeOutOfRange { value } => {
                Self::unsupported_domain(value, error.to_string())
            }
            other => Self::invalid_usage(other.to_string()),
        }
    }
}

impl From<WatchlistError> for OmmError {
    fn from(error: WatchlistError) -> Self {
        match error {
            WatchlistError::InvalidHandle { handle } => {
                Self::invalid_handle(handle.raw(), error.to_string())
            }
            WatchlistError::UnsupportedDomain { domain, .. } => {
                Self::unsupported_domain(domain, error.to_string())
            }
            WatchlistError::Validation(validation) => validation.into(),
            WatchlistError::Shutdown => Self::shutdown(error.to_string()),
            WatchlistError::InvalidUsage { message } => Self::invalid_usage(message),
            WatchlistError::Codec(codec) => codec.into(),
        }
    }
}

impl From<ReactorError> for OmmError {
    fn from(error: ReactorError) -> Self {
        if error.is_resource_exhausted() {
            return Self::memory_exhaustion(error.to_string());
        }
        match error {
            ReactorError::Shutdown => Self::shutdown(error.to_string()),
            other => Self::invalid_usage(other.to_string()),
        }
    }
}

impl From<ConfigError> for OmmError {
    fn from(error: ConfigError) -> Self {
        Self::invalid_usage(format!("configuration: {error}"))
    }
}

impl From<CodecError> for OmmError {
    fn from(error: CodecError) -> Self {
        Self::invalid_usage(error.to_string())
    }
}

pub(crate) fn unknown_handle(handle: Handle) -> OmmError {
    OmmError::invalid_handle(handle.raw(), format!("handle {handle} is not registered"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::DomainType;

    #[test]
    fn out_of_range_domain_maps_to_unsupported_domain_type() {
        let error: OmmError = DomainType::new(300).unwrap_err().into();
        assert_eq!(error.kind(), OmmErrorKind::UnsupportedDomainType);
        assert!(matches!(
            error,
            OmmError::UnsupportedDomainType(UnsupportedDomainType { domain: 300, .. })
        ));
    }

    #[test]
    fn watchlist_errors_keep_their_kind() {
        let handle = Handle::from_raw(42);
        let error: OmmError = WatchlistError::invalid_handle(handle).into();
        assert_eq!(error.kind(), OmmErrorKind::InvalidHandle);
        assert!(matches!(error, OmmError::InvalidHandle(InvalidHandle { handle: 42, .. })));

        let error: OmmError = WatchlistError::invalid_usage("no service").into();
        assert_eq!(error.kind(), OmmErrorKind::InvalidUsage);
        assert_eq!(error.text(), "no service");

        let error: OmmError = WatchlistError::Shutdown.into();
        assert_eq!(error.kind(), OmmErrorKind::Shutdown);
    }

    #[test]
    fn exhausted_buffers_map_to_memory_exhaustion() {
        let error: OmmError =
            ReactorError::from(network::TransportError::resource_exhausted("buffers", "0 free")).into();
        assert_eq!(error.kind(), OmmErrorKind::MemoryExhaustion);
    }
}
