//! Codec errors for OMM encoding and decoding
//!
//! Every decoding error carries the byte offset at which the problem was found
//! and a short context string naming the structure being read, so a corrupt
//! frame can be diagnosed from the log line alone.

use thiserror::Error;
use types::{DataType, ValidationError};

/// Encoding, decoding and dictionary errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Buffer ended before a declared structure did
    #[error("Truncated {context}: need {need} bytes at offset {offset}, {available} available")]
    Truncated {
        need: usize,
        available: usize,
        offset: usize,
        context: &'static str,
    },

    /// Data type tag not defined by the protocol
    #[error("Unknown data type tag {tag} at offset {offset}")]
    UnknownDataType { tag: u8, offset: usize },

    /// Message class byte not defined by the protocol
    #[error("Unknown message class {class} at offset {offset}")]
    UnknownMsgClass { class: u8, offset: usize },

    /// Real hint outside the supported exponent/fraction/special set
    #[error("Invalid real hint {hint} at offset {offset}: supported hints are 0-30 and 33-35")]
    InvalidRealHint { hint: u8, offset: usize },

    /// Content that does not form a valid value of its declared type
    #[error("Invalid {data_type:?} content at offset {offset}: {reason}")]
    InvalidContent {
        data_type: DataType,
        offset: usize,
        reason: String,
    },

    /// Containers nested beyond the configured limit
    #[error("Container nesting exceeds maximum depth {max_depth}")]
    DepthExceeded { max_depth: usize },

    /// Bytes left over after a complete structure was read
    #[error("{remaining} trailing bytes after {context}")]
    TrailingBytes {
        remaining: usize,
        context: &'static str,
    },

    /// More entries or bytes than the wire format can describe
    #[error("{what} too large: {size} exceeds limit {limit}")]
    TooLarge {
        what: &'static str,
        size: usize,
        limit: usize,
    },

    /// Value rejected by the data model (unsupported domain type, uncompleted container, ...)
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Malformed dictionary text file
    #[error("Dictionary {source_name} line {line}: {reason}")]
    DictionaryParse {
        source_name: String,
        line: usize,
        reason: String,
    },

    /// Dictionary payload that does not follow the dictionary domain layout
    #[error("Invalid dictionary payload: {reason}")]
    DictionaryPayload { reason: String },
}

impl CodecError {
    pub fn truncated(need: usize, available: usize, offset: usize, context: &'static str) -> Self {
        Self::Truncated {
            need,
            available,
            offset,
            context,
        }
    }

    pub fn invalid_content(data_type: DataType, offset: usize, reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            data_type,
            offset,
            reason: reason.into(),
        }
    }

    pub fn too_large(what: &'static str, size: usize, limit: usize) -> Self {
        Self::TooLarge { what, size, limit }
    }

    pub fn dictionary_parse(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::DictionaryParse {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn dictionary_payload(reason: impl Into<String>) -> Self {
        Self::DictionaryPayload {
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by inbound bytes rather than local misuse
    pub fn is_protocol_error(&self) -> bool {
        !matches!(self, Self::Validation(_))
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
