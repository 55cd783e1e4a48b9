//! Map: keyed entries with add/update/delete actions

use super::lifecycle;
use super::Data;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::protocol::{DataType, MapAction};
use bytes::Bytes;

const CONTAINER: &str = "Map";

/// One keyed entry
///
/// `Delete` entries carry [`Data::NoData`] as payload.
#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub action: MapAction,
    pub key: Data,
    pub permission: Option<Bytes>,
    pub payload: Data,
}

/// Entries keyed by a primitive, all payloads sharing one container type
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Map {
    key_type: Option<DataType>,
    container_type: Option<DataType>,
    key_field_id: Option<i16>,
    total_count_hint: Option<u32>,
    summary: Option<Box<Data>>,
    entries: Vec<MapEntry>,
    completed: bool,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded map, already complete
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        key_type: DataType,
        container_type: DataType,
        key_field_id: Option<i16>,
        total_count_hint: Option<u32>,
        summary: Option<Data>,
        entries: Vec<MapEntry>,
    ) -> Self {
        Self {
            key_type: Some(key_type),
            container_type: (container_type != DataType::NoData).then_some(container_type),
            key_field_id,
            total_count_hint,
            summary: summary.map(Box::new),
            entries,
            completed: true,
        }
    }

    /// Field id the keys correspond to in the payload field lists
    pub fn key_field_id(&mut self, fid: i16) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.key_field_id = Some(fid);
        Ok(self)
    }

    pub fn total_count_hint(&mut self, count: u32) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.total_count_hint = Some(count);
        Ok(self)
    }

    /// Summary data shared by every entry; must precede the first entry
    pub fn summary_data(&mut self, summary: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        if !self.entries.is_empty() {
            return Err(ValidationError::SummaryAfterEntries { container: CONTAINER });
        }
        let summary = summary.into();
        self.check_container_type(summary.data_type())?;
        self.summary = Some(Box::new(summary));
        Ok(self)
    }

    pub fn add_entry(
        &mut self,
        key: impl Into<Data>,
        action: MapAction,
        payload: impl Into<Data>,
    ) -> ValidationResult<&mut Self> {
        self.add_entry_with_permission(key, action, payload, None)
    }

    pub fn add_entry_with_permission(
        &mut self,
        key: impl Into<Data>,
        action: MapAction,
        payload: impl Into<Data>,
        permission: Option<Bytes>,
    ) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        let key = key.into();
        let key_type = key.data_type();
        if !key_type.is_valid_map_key() || key.is_blank() {
            return Err(ValidationError::invalid(
                "map key",
                format!("{key_type:?} cannot be used as a key"),
            ));
        }
        if let Some(expected) = self.key_type {
            if expected != key_type {
                return Err(ValidationError::TypeMismatch {
                    container: CONTAINER,
                    expected,
                    got: key_type,
                });
            }
        }

        let payload = if action == MapAction::Delete {
            Data::NoData
        } else {
            payload.into()
        };
        self.check_container_type(payload.data_type())?;

        self.key_type = Some(key_type);
        self.entries.push(MapEntry {
            action,
            key,
            permission,
            payload,
        });
        Ok(self)
    }

    /// Delete entry; carries no payload
    pub fn delete(&mut self, key: impl Into<Data>) -> ValidationResult<&mut Self> {
        self.add_entry(key, MapAction::Delete, Data::NoData)
    }

    fn check_container_type(&mut self, got: DataType) -> ValidationResult<()> {
        if got == DataType::NoData {
            return Ok(());
        }
        match self.container_type {
            Some(expected) if expected != got => Err(ValidationError::TypeMismatch {
                container: CONTAINER,
                expected,
                got,
            }),
            _ => {
                self.container_type = Some(got);
                Ok(())
            }
        }
    }

    pub fn complete(&mut self) -> ValidationResult<()> {
        lifecycle::complete(&mut self.completed, self.entries.len(), CONTAINER)
    }

    /// Key type; `Buffer` until the first entry fixes it
    pub fn key_type(&self) -> DataType {
        self.key_type.unwrap_or(DataType::Buffer)
    }

    /// Container type of entry payloads; `NoData` when only deletes were added
    pub fn container_type(&self) -> DataType {
        self.container_type.unwrap_or(DataType::NoData)
    }

    pub fn key_fid(&self) -> Option<i16> {
        self.key_field_id
    }

    pub fn count_hint(&self) -> Option<u32> {
        self.total_count_hint
    }

    pub fn summary(&self) -> Option<&Data> {
        self.summary.as_deref()
    }

    pub fn entries(&self) -> &[MapEntry] {
        &self.entries
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
