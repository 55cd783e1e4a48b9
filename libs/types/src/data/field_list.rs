//! Field list: entries keyed by dictionary field id

use super::datetime::{Date, DateTime, Time};
use super::lifecycle;
use super::real::{Real, RealHint};
use super::rmtes::RmtesBuffer;
use super::Data;
use crate::common::errors::ValidationResult;
use crate::protocol::DataType;
use bytes::Bytes;

const CONTAINER: &str = "FieldList";

/// Dictionary id and field list template number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldListInfo {
    pub dictionary_id: u16,
    pub field_list_num: i16,
}

/// One `(fid, value)` pair
#[derive(Debug, Clone, PartialEq)]
pub struct FieldEntry {
    pub fid: i16,
    pub data: Data,
}

/// Ordered field entries
///
/// Field ids are not required to be unique; receivers apply entries in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldList {
    info: Option<FieldListInfo>,
    entries: Vec<FieldEntry>,
    completed: bool,
}

impl FieldList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded field list, already complete
    pub fn from_parts(info: Option<FieldListInfo>, entries: Vec<FieldEntry>) -> Self {
        Self {
            info,
            entries,
            completed: true,
        }
    }

    pub fn info(&mut self, dictionary_id: u16, field_list_num: i16) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.info = Some(FieldListInfo {
            dictionary_id,
            field_list_num,
        });
        Ok(self)
    }

    pub fn add_entry(&mut self, fid: i16, data: impl Into<Data>) -> ValidationResult<&mut Self> {
        lifecycle::ensure_open(self.completed, CONTAINER)?;
        self.entries.push(FieldEntry {
            fid,
            data: data.into(),
        });
        Ok(self)
    }

    pub fn add_int(&mut self, fid: i16, value: i64) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Int(value))
    }

    pub fn add_uint(&mut self, fid: i16, value: u64) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::UInt(value))
    }

    pub fn add_real(&mut self, fid: i16, mantissa: i64, hint: RealHint) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Real(Real::new(mantissa, hint)))
    }

    /// Real from a double, rounded to the nearest mantissa for `hint`
    pub fn add_real_from_f64(&mut self, fid: i16, value: f64, hint: RealHint) -> ValidationResult<&mut Self> {
        let real = Real::from_f64(value, hint)?;
        self.add_entry(fid, Data::Real(real))
    }

    pub fn add_date(&mut self, fid: i16, year: u16, month: u8, day: u8) -> ValidationResult<&mut Self> {
        let date = Date::new(year, month, day)?;
        self.add_entry(fid, Data::Date(date))
    }

    pub fn add_time(&mut self, fid: i16, hour: u8, minute: u8, second: u8) -> ValidationResult<&mut Self> {
        let time = Time::new(hour, minute, second)?;
        self.add_entry(fid, Data::Time(time))
    }

    pub fn add_date_time(&mut self, fid: i16, value: DateTime) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::DateTime(value))
    }

    pub fn add_enum(&mut self, fid: i16, value: u16) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Enum(value))
    }

    pub fn add_ascii(&mut self, fid: i16, value: impl Into<String>) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Ascii(value.into()))
    }

    pub fn add_utf8(&mut self, fid: i16, value: impl Into<String>) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Utf8(value.into()))
    }

    pub fn add_rmtes(&mut self, fid: i16, value: impl Into<Vec<u8>>) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Rmtes(RmtesBuffer::new(value)))
    }

    pub fn add_buffer(&mut self, fid: i16, value: impl Into<Bytes>) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Buffer(value.into()))
    }

    /// Blank value of a primitive type
    pub fn add_blank(&mut self, fid: i16, data_type: DataType) -> ValidationResult<&mut Self> {
        self.add_entry(fid, Data::Blank(data_type))
    }

    pub fn complete(&mut self) -> ValidationResult<()> {
        lifecycle::complete(&mut self.completed, self.entries.len(), CONTAINER)
    }

    pub fn list_info(&self) -> Option<FieldListInfo> {
        self.info
    }

    pub fn entries(&self) -> &[FieldEntry] {
        &self.entries
    }

    /// First entry with the given fid
    pub fn get(&self, fid: i16) -> Option<&Data> {
        self.entries.iter().find(|entry| entry.fid == fid).map(|entry| &entry.data)
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
    use crate::common::errors::ValidationError;

    #[test]
    fn builds_and_looks_up_entries() {
        let mut fields = FieldList::new();
        fields
            .add_real(22, 3990, RealHint::ExponentNeg2)
            .unwrap()
            .add_real(25, 3994, RealHint::ExponentNeg2)
            .unwrap()
            .add_uint(32, 1500)
            .unwrap()
            .add_blank(30, DataType::Real)
            .unwrap();
        fields.complete().unwrap();

        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get(32), Some(&Data::UInt(1500)));
        assert_eq!(fields.get(30), Some(&Data::Blank(DataType::Real)));
        assert!(fields.get(99).is_none());
    }

    #[test]
    fn invalid_date_fails_at_add() {
        let mut fields = FieldList::new();
        assert!(matches!(
            fields.add_date(16, 2024, 2, 30).unwrap_err(),
            ValidationError::InvalidValue { .. }
        ));
        assert!(fields.is_empty());
    }
}
