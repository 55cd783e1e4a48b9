//! Filter list: entries keyed by a small filter id

use super::lifecycle;
use super::Data;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::protocol::FilterAction;
use bytes::Bytes;

const CONTAINER: &str = "FilterList";

/// One filter entry; `Clear` entries carry no payload
#[derive(Debug, Clone, PartialEq)]
pub struct FilterEntry {
    pub id: u8,
    pub action: FilterAction,
    pub permission: Option<Bytes>,
    pub payload: Data,
}

/// Entries keyed by filter id; payload types may differ per entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterList {
    total_count_hint: Option<u8>,
    entries: Vec<FilterEntry>,
    completed: bool,
}

impl FilterList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded filter list, already complete
    pub fn from_parts(total_count_hint: Option<u8>, entries: Vec<FilterEntry>) -> Self {
        Self {
            total_count_hint,
            entries,
            completed: true,
        }
    }

    pub fn total_count_hint(&mut self, count: u8) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.total_count_hint = Some(count);
        Ok(self)
    }

    pub fn add_entry(
        &mut self,
        id: u8,
        action: FilterAction,
        payload: impl Into<Data>,
    ) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        if id > 31 {
            return Err(ValidationError::invalid("filter id", format!("{id} exceeds 31")));
        }
        let payload = if action == FilterAction::Clear {
            Data::NoData
        } else {
            payload.into()
        };
        self.entries.push(FilterEntry {
            id,
            action,
            permission: None,
            payload,
        });
        Ok(self)
    }

    pub fn complete(&mut self) -> ValidationResult<()> {
        lifecycle::complete(&mut self.completed, self.entries.len(), CONTAINER)
    }

    pub fn count_hint(&self) -> Option<u8> {
        self.total_count_hint
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    /// Last entry with the given id
    pub fn get(&self, id: u8) -> Option<&FilterEntry> {
        self.entries.iter().rev().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_drops_payload_and_ids_are_bounded() {
        let mut list = FilterList::new();
        list.add_entry(2, FilterAction::Clear, Data::UInt(1)).unwrap();
        assert_eq!(list.entries()[0].payload, Data::NoData);
        assert!(list.add_entry(32, FilterAction::Set, Data::NoData).is_err());
    }
}
