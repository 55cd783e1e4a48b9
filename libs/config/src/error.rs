//! Configuration errors
//!
//! Builders report a bad value at the setter that received it; file loading
//! reports the path and the underlying parser error.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value outside its allowed range or format
    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// A required value was never set
    #[error("Missing required setting {field}")]
    Missing { field: String },

    /// A session or default names a channel that does not exist
    #[error("Unknown {kind} '{name}' referenced by {referrer}")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    /// The same identity configured twice
    #[error("Duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// File could not be read or deserialized
    #[error("Failed to load configuration from {path}: {source}")]
    Load {
        path: PathBuf,
        source: config_crate::ConfigError,
    },

    /// Configuration could not be written out
    #[error("Failed to serialize configuration: {reason}")]
    Serialize { reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing {
            field: field.into(),
        }
    }

    pub fn unknown(kind: &'static str, name: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self::UnknownReference {
            kind,
            name: name.into(),
            referrer: referrer.into(),
        }
    }

    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
        }
    }

    /// Name of the offending setting, when the error is about one
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { field, .. } | ConfigError::Missing { field } => Some(field),
            _ => None,
        }
    }
}
