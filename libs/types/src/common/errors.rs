//! Error types for value construction and container usage
//!
//! Every constructor or builder call that can receive an out-of-range value or be
//! used out of sequence reports the problem here, at the offending call, rather
//! than letting the bad value travel towards the wire.

use crate::protocol::DataType;
use thiserror::Error;

/// Result alias for validated construction
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Errors raised while building messages and containers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// Domain type outside the 1..=255 range carried by the wire format
    #[error("Domain type {value} is not supported: valid range is 1-255")]
    DomainTypeOutOfRange { value: u16 },

    /// `complete()` called on a container that was already completed
    #[error("{container} has already been completed")]
    AlreadyCompleted { container: &'static str },

    /// `complete()` called before any entry was appended
    #[error("{container} completed before any entries were added")]
    EmptyContainer { container: &'static str },

    /// A container was used as a payload without being completed
    #[error("{container} has not been completed (call complete() before submitting)")]
    NotCompleted { container: &'static str },

    /// An entry was appended to a completed container
    #[error("Cannot add an entry to {container} after complete()")]
    AddAfterComplete { container: &'static str },

    /// Entry data type does not match the container's declared type
    #[error("{container} entry type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch {
        container: &'static str,
        expected: DataType,
        got: DataType,
    },

    /// Summary data set after entries were added
    #[error("{container} summary data must be set before the first entry")]
    SummaryAfterEntries { container: &'static str },

    /// Value that cannot be represented
    #[error("Invalid {what}: {reason}")]
    InvalidValue { what: &'static str, reason: String },
}

impl ValidationError {
    /// Create an InvalidValue error with context
    pub fn invalid(what: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            what,
            reason: reason.into(),
        }
    }
}
