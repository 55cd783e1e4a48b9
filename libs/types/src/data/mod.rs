//! Primitive values and self-describing containers
//!
//! ## Purpose
//!
//! [`Data`] is the tagged value carried as a message payload, a container entry
//! value, a map key or an array item. Primitives hold their value directly;
//! containers hold ordered entries and a completion flag.
//!
//! ## Two-Phase Containers
//!
//! Containers follow an "open, append entries, complete" protocol:
//!
//! ```text
//! FieldList::new() ─► add_*() … ─► complete() ─► usable as payload
//!                         │              │
//!                         └─ after complete: AddAfterComplete
//!                                        └─ twice / empty: AlreadyCompleted / EmptyContainer
//! ```
//!
//! Decoded containers are built with `from_parts` and are already complete.
//! [`Data::validate_complete`] walks an arbitrarily deep payload without
//! recursion so a hostile nesting depth cannot exhaust the stack.

pub mod array;
pub mod datetime;
pub mod element_list;
pub mod field_list;
pub mod filter_list;
mod lifecycle;
pub mod map;
pub mod qos;
pub mod real;
pub mod rmtes;
pub mod series;
pub mod state;

use crate::common::errors::{ValidationError, ValidationResult};
use crate::messages::Msg;
use crate::protocol::DataType;
use bytes::Bytes;

pub use array::OmmArray;
pub use datetime::{Date, DateTime, Time};
pub use element_list::{ElementEntry, ElementList};
pub use field_list::{FieldEntry, FieldList, FieldListInfo};
pub use filter_list::{FilterEntry, FilterList};
pub use map::{Map, MapEntry};
pub use qos::{Qos, Rate, Timeliness};
pub use real::{Real, RealHint};
pub use rmtes::RmtesBuffer;
pub use series::Series;
pub use state::State;

/// Tagged OMM value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Data {
    #[default]
    NoData,
    /// Primitive of the given type with no value
    Blank(DataType),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Real(Real),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Qos(Qos),
    State(State),
    Enum(u16),
    Buffer(Bytes),
    Ascii(String),
    Utf8(String),
    Rmtes(RmtesBuffer),
    Array(OmmArray),
    FieldList(FieldList),
    ElementList(ElementList),
    Map(Map),
    FilterList(FilterList),
    Series(Series),
    Opaque(Bytes),
    Xml(String),
    Msg(Box<Msg>),
}

impl Data {
    pub fn data_type(&self) -> DataType {
        match self {
            Data::NoData => DataType::NoData,
            Data::Blank(data_type) => *data_type,
            Data::Int(_) => DataType::Int,
            Data::UInt(_) => DataType::UInt,
            Data::Float(_) => DataType::Float,
            Data::Double(_) => DataType::Double,
            Data::Real(_) => DataType::Real,
            Data::Date(_) => DataType::Date,
            Data::Time(_) => DataType::Time,
            Data::DateTime(_) => DataType::DateTime,
            Data::Qos(_) => DataType::Qos,
            Data::State(_) => DataType::State,
            Data::Enum(_) => DataType::Enum,
            Data::Buffer(_) => DataType::Buffer,
            Data::Ascii(_) => DataType::AsciiString,
            Data::Utf8(_) => DataType::Utf8String,
            Data::Rmtes(_) => DataType::RmtesString,
            Data::Array(_) => DataType::Array,
            Data::FieldList(_) => DataType::FieldList,
            Data::ElementList(_) => DataType::ElementList,
            Data::Map(_) => DataType::Map,
            Data::FilterList(_) => DataType::FilterList,
            Data::Series(_) => DataType::Series,
            Data::Opaque(_) => DataType::Opaque,
            Data::Xml(_) => DataType::Xml,
            Data::Msg(_) => DataType::Msg,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Data::Blank(_))
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Data::NoData)
    }

    /// Number of entries for containers, zero for everything else
    pub fn entry_count(&self) -> usize {
        match self {
            Data::Array(array) => array.len(),
            Data::FieldList(list) => list.len(),
            Data::ElementList(list) => list.len(),
            Data::Map(map) => map.len(),
            Data::FilterList(list) => list.len(),
            Data::Series(series) => series.len(),
            _ => 0,
        }
    }

    /// Check that this value and every container nested inside it was completed
    pub fn validate_complete(&self) -> ValidationResult<()> {
        let mut pending: Vec<&Data> = vec![self];
        while let Some(data) = pending.pop() {
            match data {
                Data::Array(array) => {
                    require_completed(array.is_completed(), "OmmArray")?;
                }
                Data::FieldList(list) => {
                    require_completed(list.is_completed(), "FieldList")?;
                    pending.extend(list.entries().iter().map(|entry| &entry.data));
                }
                Data::ElementList(list) => {
                    require_completed(list.is_completed(), "ElementList")?;
                    pending.extend(list.entries().iter().map(|entry| &entry.data));
                }
                Data::Map(map) => {
                    require_completed(map.is_completed(), "Map")?;
                    pending.extend(map.summary());
                    for entry in map.entries() {
                        pending.push(&entry.key);
                        pending.push(&entry.payload);
                    }
                }
                Data::FilterList(list) => {
                    require_completed(list.is_completed(), "FilterList")?;
                    pending.extend(list.entries().iter().map(|entry| &entry.payload));
                }
                Data::Series(series) => {
                    require_completed(series.is_completed(), "Series")?;
                    pending.extend(series.summary());
                    pending.extend(series.entries());
                }
                Data::Msg(msg) => {
                    pending.push(msg.payload());
                    if let Some(attrib) = msg.key().and_then(|key| key.attrib.as_deref()) {
                        pending.push(attrib);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn as_field_list(&self) -> Option<&FieldList> {
        match self {
            Data::FieldList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_element_list(&self) -> Option<&ElementList> {
        match self {
            Data::ElementList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Data::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_filter_list(&self) -> Option<&FilterList> {
        match self {
            Data::FilterList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&Series> {
        match self {
            Data::Series(series) => Some(series),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&OmmArray> {
        match self {
            Data::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_msg(&self) -> Option<&Msg> {
        match self {
            Data::Msg(msg) => Some(msg),
            _ => None,
        }
    }

    /// Text view of string-like primitives
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Ascii(text) | Data::Utf8(text) | Data::Xml(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Data::UInt(value) => Some(*value),
            Data::Int(value) => u64::try_from(*value).ok(),
            Data::Enum(value) => Some(*value as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Data::Int(value) => Some(*value),
            Data::UInt(value) => i64::try_from(*value).ok(),
            Data::Enum(value) => Some(*value as i64),
            _ => None,
        }
    }
}

fn require_completed(completed: bool, container: &'static str) -> ValidationResult<()> {
    if completed {
        Ok(())
    } else {
        Err(ValidationError::NotCompleted { container })
    }
}

macro_rules! impl_data_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Data {
                fn from(value: $source) -> Self {
                    Data::$variant(value)
                }
            }
        )*
    };
}

impl_data_from! {
    i64 => Int,
    u64 => UInt,
    f32 => Float,
    f64 => Double,
    Real => Real,
    Date => Date,
    Time => Time,
    DateTime => DateTime,
    Qos => Qos,
    State => State,
    RmtesBuffer => Rmtes,
    OmmArray => Array,
    FieldList => FieldList,
    ElementList => ElementList,
    Map => Map,
    FilterList => FilterList,
    Series => Series,
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::Ascii(value.to_string())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::Ascii(value)
    }
}

impl From<Msg> for Data {
    fn from(value: Msg) -> Self {
        Data::Msg(Box::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompleted_nested_container_is_detected() {
        let mut inner = FieldList::new();
        inner.add_uint(1, 5).unwrap();

        let mut outer = ElementList::new();
        outer.add_entry("Inner", Data::FieldList(inner)).unwrap();
        outer.complete().unwrap();

        let err = Data::from(outer).validate_complete().unwrap_err();
        assert_eq!(err, ValidationError::NotCompleted { container: "FieldList" });
    }

    #[test]
    fn completed_payload_validates() {
        let mut fields = FieldList::new();
        fields.add_real(22, 3990, RealHint::ExponentNeg2).unwrap();
        fields.complete().unwrap();
        let data = Data::from(fields);
        assert!(data.validate_complete().is_ok());
        assert_eq!(data.data_type(), DataType::FieldList);
        assert_eq!(data.entry_count(), 1);
    }

    #[test]
    fn blank_reports_its_primitive_type() {
        assert_eq!(Data::Blank(DataType::Real).data_type(), DataType::Real);
        assert!(Data::NoData.validate_complete().is_ok());
    }
}
