//! # OMM Codec
//!
//! ## Purpose
//!
//! The rules layer between the pure data model and the transport:
//! - Primitive, container and message encoding/decoding
//! - Depth-bounded, bounds-checked decoding of untrusted frames
//! - The data dictionary (text files, dictionary-domain payloads, shared registry)
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → network/
//!     ↑           ↓          ↓
//! Pure Data   Wire Rules  Framed
//! Msg, Data   Encoder     Connections
//! FieldList   Decoder
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Framing, handshakes or sockets (belongs in network/)
//! - Stream state (belongs in watchlist/)
//!
//! ## Quick Start
//!
//! ```rust
//! use codec::{decode_msg, encode_msg};
//! use types::{FieldList, Msg, RealHint, RefreshMsg};
//!
//! let mut fields = FieldList::new();
//! fields.add_real(22, 3990, RealHint::ExponentNeg2).unwrap();
//! fields.complete().unwrap();
//!
//! let refresh = RefreshMsg::new().stream_id(5).name("IBM.N").payload(fields);
//! let bytes = encode_msg(&Msg::from(refresh.clone())).unwrap();
//! assert_eq!(decode_msg(&bytes).unwrap(), Msg::from(refresh));
//! ```

pub mod constants;
pub mod decoder;
pub mod dictionary;
pub mod encoder;
pub mod error;
pub mod primitives;
pub mod reader;

pub use decoder::Decoder;
pub use dictionary::payload::{
    apply_enum_payload, apply_field_payload, apply_payload, encode_enum_tables,
    encode_field_dictionary, payload_kind, DictionaryKind, ENUM_DICTIONARY_NAME,
    FIELD_DICTIONARY_NAME,
};
pub use dictionary::{
    DataDictionary, DictionaryInfo, DictionaryRegistry, EnumTable, FieldDef, MfType, Verbosity,
};
pub use encoder::Encoder;
pub use error::{CodecError, CodecResult};

use bytes::Bytes;
use types::Msg;

/// Encode `msg` with the default nesting limit
pub fn encode_msg(msg: &Msg) -> CodecResult<Bytes> {
    Encoder::default().encode_msg(msg)
}

/// Decode one message with the default nesting limit
pub fn decode_msg(bytes: &[u8]) -> CodecResult<Msg> {
    Decoder::default().decode_msg(bytes)
}
