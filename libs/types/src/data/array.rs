//! Homogeneous array of primitives

use super::lifecycle;
use super::Data;
use crate::common::errors::{ValidationError, ValidationResult};
use crate::protocol::DataType;

const CONTAINER: &str = "OmmArray";

/// Ordered primitives of a single type, optionally fixed-width on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct OmmArray {
    item_type: DataType,
    fixed_width: u8,
    items: Vec<Data>,
    completed: bool,
}

impl OmmArray {
    pub fn new(item_type: DataType) -> Self {
        Self {
            item_type,
            fixed_width: 0,
            items: Vec::new(),
            completed: false,
        }
    }

    /// Decoded array, already complete
    pub fn from_parts(item_type: DataType, fixed_width: u8, items: Vec<Data>) -> Self {
        Self {
            item_type,
            fixed_width,
            items,
            completed: true,
        }
    }

    /// Fixed item width in bytes; zero means each item carries its own length
    pub fn fixed_width(&mut self, width: u8) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        if !self.items.is_empty() {
            return Err(ValidationError::invalid(
                "array width",
                "must be set before the first item",
            ));
        }
        self.fixed_width = width;
        Ok(self)
    }

    pub fn add(&mut self, item: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        let item = item.into();
        if !self.item_type.is_primitive() || self.item_type == DataType::Array {
            return Err(ValidationError::invalid(
                "array item type",
                format!("{:?} is not a primitive", self.item_type),
            ));
        }
        if item.data_type() != self.item_type {
            return Err(ValidationError::TypeMismatch {
                container: CONTAINER,
                expected: self.item_type,
                got: item.data_type(),
            });
        }
        self.items.push(item);
        Ok(self)
    }

    pub fn add_ascii(&mut self, value: impl Into<String>) -> ValidationResult<&mut Self> {
        self.add(Data::Ascii(value.into()))
    }

    pub fn add_int(&mut self, value: i64) -> ValidationResult<&mut Self> {
        self.add(Data::Int(value))
    }

    pub fn add_uint(&mut self, value: u64) -> ValidationResult<&mut Self> {
        self.add(Data::UInt(value))
    }

    pub fn add_enum(&mut self, value: u16) -> ValidationResult<&mut Self> {
        self.add(Data::Enum(value))
    }

    pub fn complete(&mut self) -> ValidationResult<()> {
        lifecycle::complete(&mut self.completed, self.items.len(), CONTAINER)
    }

    pub fn item_type(&self) -> DataType {
        self.item_type
    }

    pub fn width(&self) -> u8 {
        self.fixed_width
    }

    pub fn items(&self) -> &[Data] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_must_match_declared_type() {
        let mut array = OmmArray::new(DataType::AsciiString);
        array.add_ascii("IBM.N").unwrap();
        let err = array.add_int(5).unwrap_err();
        assert!(matches!(err, ValidationError::TypeMismatch { .. }));
    }

    #[test]
    fn complete_rules() {
        let mut array = OmmArray::new(DataType::Int);
        assert_eq!(
            array.complete().unwrap_err(),
            ValidationError::EmptyContainer { container: CONTAINER }
        );
        array.add_int(22).unwrap().add_int(25).unwrap();
        array.complete().unwrap();
        assert_eq!(
            array.complete().unwrap_err(),
            ValidationError::AlreadyCompleted { container: CONTAINER }
        );
        assert_eq!(
            array.add_int(30).unwrap_err(),
            ValidationError::AddAfterComplete { container: CONTAINER }
        );
    }
}
