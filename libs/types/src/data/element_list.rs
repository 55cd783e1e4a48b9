//! Element list: entries keyed by name

use super::lifecycle;
use super::Data;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::protocol::DataType;

const CONTAINER: &str = "ElementList";

/// One `(name, value)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct ElementEntry {
    pub name: String,
    pub data: Data,
}

/// Ordered named entries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementList {
    list_num: Option<i16>,
    entries: Vec<ElementEntry>,
    completed: bool,
}

impl ElementList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded element list, already complete
    pub fn from_parts(list_num: Option<i16>, entries: Vec<ElementEntry>) -> Self {
        Self {
            list_num,
            entries,
            completed: true,
        }
    }

    pub fn list_num(&mut self, number: i16) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.list_num = Some(number);
        Ok(self)
    }

    pub fn add_entry(&mut self, name: impl Into<String>, data: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        let name = name.into();
        if name.len() > u16::MAX as usize {
            return Err(ValidationError::invalid("element name", "longer than 65535 bytes"));
        }
        self.entries.push(ElementEntry {
            name,
            data: data.into(),
        });
        Ok(self)
    }

    pub fn add_int(&mut self, name: impl Into<String>, value: i64) -> ValidationResult<&mut Self> {
        self.add_entry(name, Data::Int(value))
    }

    pub fn add_uint(&mut self, name: impl Into<String>, value: u64) -> ValidationResult<&mut Self> {
        self.add_entry(name, Data::UInt(value))
    }

    pub fn add_ascii(&mut self, name: impl Into<String>, value: impl Into<String>) -> ValidationResult<&mut Self> {
        self.add_entry(name, Data::Ascii(value.into()))
    }

    pub fn add_enum(&mut self, name: impl Into<String>, value: u16) -> ValidationResult<&mut Self> {
        self.add_entry(name, Data::Enum(value))
    }

    pub fn add_blank(&mut self, name: impl Into<String>, data_type: DataType) -> ValidationResult<&mut Self> {
        self.add_entry(name, Data::Blank(data_type))
    }

    pub fn complete(&mut self) -> ValidationResult<()> {
        lifecycle::complete(&mut self.completed, self.entries.len(), CONTAINER)
    }

    pub fn element_list_num(&self) -> Option<i16> {
        self.list_num
    }

    pub fn entries(&self) -> &[ElementEntry] {
        &self.entries
    }

    /// First entry with the given name
    pub fn get(&self, name: &str) -> Option<&Data> {
        self.entries.iter().find(|entry| entry.name == name).map(|entry| &entry.data)
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
