//! Message key: what a stream is about

use crate::data::Data;

/// Identifies the item a stream carries
///
/// A consumer usually names the service; the watchlist resolves the name to a
/// service id before the request reaches the wire. Both travel when present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MsgKey {
    pub name: Option<String>,
    pub name_type: Option<u8>,
    pub service_id: Option<u16>,
    pub service_name: Option<String>,
    pub filter: Option<u32>,
    pub identifier: Option<i32>,
    pub attrib: Option<Box<Data>>,
}

impl MsgKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Two keys name the same item when name, name type, service and filter agree
    ///
    /// Attributes do not participate; they travel with the request only.
    pub fn same_item(&self, other: &MsgKey) -> bool {
        self.name == other.name
            && self.name_type.unwrap_or(1) == other.name_type.unwrap_or(1)
            && self.service_id == other.service_id
            && self.filter == other.filter
            && self.identifier == other.identifier
    }
}
