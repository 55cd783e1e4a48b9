//! Protocol enumerations shared by every layer
//!
//! Wire values for message classes, data types, stream/data states and entry
//! actions. Protocol logic (encoding rules, framing) lives in `codec`.

pub mod constants;
pub mod domain;

pub use constants::{
    DataState, DataType, FilterAction, MapAction, MsgClass, NackCode, StatusCode, StreamState,
};
pub use domain::DomainType;
