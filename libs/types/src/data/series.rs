//! Series: ordered entries of a single container type

use super::lifecycle;
use super::Data;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::protocol::DataType;

const CONTAINER: &str = "Series";

/// Ordered entries without keys or actions, used by the dictionary domain
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    container_type: Option<DataType>,
    total_count_hint: Option<u32>,
    summary: Option<Box<Data>>,
    entries: Vec<Data>,
    completed: bool,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded series, already complete
    pub fn from_parts(
        container_type: DataType,
        total_count_hint: Option<u32>,
        summary: Option<Data>,
        entries: Vec<Data>,
    ) -> Self {
        Self {
            container_type: Some(container_type),
            total_count_hint,
            summary: summary.map(Box::new),
            entries,
            completed: true,
        }
    }

    pub fn total_count_hint(&mut self, count: u32) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.total_count_hint = Some(count);
        Ok(self)
    }

    pub fn summary_data(&mut self, summary: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        if !self.entries.is_empty() {
            return Err(ValidationError::SummaryAfterEntries { container: CONTAINER });
        }
        let summary = summary.into();
        self.check_type(summary.data_type())?;
        self.summary = Some(Box::new(summary));
        Ok(self)
    }

    pub fn add_entry(&mut self, entry: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        let entry = entry.into();
        self.check_type(entry.data_type())?;
        self.entries.push(entry);
        Ok(self)
    }

    fn check_type(&mut self, got: DataType) -> ValidationResult<()> {
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

    pub fn container_type(&self) -> DataType {
        self.container_type.unwrap_or(DataType::NoData)
    }

    pub fn count_hint(&self) -> Option<u32> {
        self.total_count_hint
    }

    pub fn summary(&self) -> Option<&Data> {
        self.summary.as_deref()
    }

    pub fn entries(&self) -> &[Data] {
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
