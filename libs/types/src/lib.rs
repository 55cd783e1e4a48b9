//! # OMM Types Library
//!
//! Data model for the open message model (OMM): domain types, message classes,
//! primitive values, self-describing containers and the message structures that
//! travel over a channel.
//!
//! ## Design Philosophy
//!
//! - **No Precision Loss**: prices are carried as [`Real`] values, an integer
//!   mantissa scaled by an enumerated power-of-ten (or power-of-two) hint
//! - **Two-Phase Containers**: containers are opened, filled and explicitly
//!   completed; an uncompleted container is rejected before it can reach the wire
//! - **Validated Construction**: out-of-range values (for example a domain type
//!   above 255) fail at the call that introduced them
//! - **Clear Boundaries**: this crate holds pure data; wire encoding lives in
//!   `codec`, transports in `network`
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Data, DomainType, FieldList, ReqMsg, RealHint};
//!
//! let request = ReqMsg::new()
//!     .domain(DomainType::MARKET_PRICE)
//!     .name("IBM.N")
//!     .service_name("DIRECT_FEED");
//! assert!(request.streaming);
//!
//! let mut fields = FieldList::new();
//! fields
//!     .add_real(22, 3990, RealHint::ExponentNeg2)
//!     .unwrap()
//!     .add_uint(32, 1500)
//!     .unwrap();
//! fields.complete().unwrap();
//! assert_eq!(Data::from(fields).entry_count(), 2);
//! ```

pub mod common;
pub mod data;
pub mod messages;
pub mod protocol;
pub mod rdm;

pub use common::errors::{ValidationError, ValidationResult};
pub use data::array::OmmArray;
pub use data::datetime::{Date, DateTime, Time};
pub use data::element_list::{ElementEntry, ElementList};
pub use data::field_list::{FieldEntry, FieldList, FieldListInfo};
pub use data::filter_list::{FilterEntry, FilterList};
pub use data::map::{Map, MapEntry};
pub use data::qos::{Qos, Rate, Timeliness};
pub use data::real::{Real, RealHint};
pub use data::rmtes::RmtesBuffer;
pub use data::series::Series;
pub use data::state::State;
pub use data::Data;
pub use messages::{
    AckMsg, CloseMsg, GenericMsg, Msg, MsgKey, PostMsg, PostUserInfo, Priority, RefreshMsg,
    ReqMsg, StatusMsg, UpdateMsg,
};
pub use protocol::{
    DataState, DataType, DomainType, FilterAction, MapAction, MsgClass, NackCode, StatusCode,
    StreamState,
};
