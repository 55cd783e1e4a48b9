//! Data dictionary: field definitions and enumerated value tables
//!
//! ## Purpose
//!
//! Field lists identify values by numeric field id. The dictionary maps each id
//! to its acronym, wire type and display metadata, and maps enumerated values to
//! display strings. It is loaded either from the standard text files or from
//! dictionary-domain refresh payloads.
//!
//! ```text
//! RDMFieldDictionary ─┐                        ┌─► DataDictionary ─► DictionaryRegistry
//!                     ├─► text::parse_*() ─────┤         │                (shared, explicit)
//! enumtype.def ───────┘                        │         ▼
//! RWFFld / RWFEnum refresh ─► payload::apply_*()┘   payload::encode_*() ─► provider refresh
//! ```

pub mod payload;
pub mod registry;
pub mod text;

use crate::error::{CodecError, CodecResult};
use std::collections::{BTreeMap, HashMap};
use types::DataType;

pub use payload::Verbosity;
pub use registry::DictionaryRegistry;

/// Field type of the legacy marketfeed format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MfType {
    None,
    TimeSeconds,
    Integer,
    Numeric,
    Date,
    Price,
    Alphanumeric,
    Enumerated,
    Time,
    Binary,
    LongAlphanumeric,
    Opaque,
}

impl MfType {
    pub fn code(self) -> i64 {
        match self {
            MfType::None => -2,
            MfType::TimeSeconds => -1,
            MfType::Integer => 0,
            MfType::Numeric => 1,
            MfType::Date => 2,
            MfType::Price => 3,
            MfType::Alphanumeric => 4,
            MfType::Enumerated => 5,
            MfType::Time => 6,
            MfType::Binary => 7,
            MfType::LongAlphanumeric => 8,
            MfType::Opaque => 9,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            -2 => MfType::None,
            -1 => MfType::TimeSeconds,
            0 => MfType::Integer,
            1 => MfType::Numeric,
            2 => MfType::Date,
            3 => MfType::Price,
            4 => MfType::Alphanumeric,
            5 => MfType::Enumerated,
            6 => MfType::Time,
            7 => MfType::Binary,
            8 => MfType::LongAlphanumeric,
            9 => MfType::Opaque,
            _ => return None,
        })
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "NONE" => MfType::None,
            "TIME_SECONDS" => MfType::TimeSeconds,
            "INTEGER" => MfType::Integer,
            "NUMERIC" => MfType::Numeric,
            "DATE" => MfType::Date,
            "PRICE" => MfType::Price,
            "ALPHANUMERIC" => MfType::Alphanumeric,
            "ENUMERATED" => MfType::Enumerated,
            "TIME" => MfType::Time,
            "BINARY" => MfType::Binary,
            "LONG_ALPHANUMERIC" => MfType::LongAlphanumeric,
            "OPAQUE" => MfType::Opaque,
            _ => return None,
        })
    }
}

/// One field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub fid: i16,
    pub acronym: String,
    pub dde_acronym: String,
    /// Field that receives this field's previous value on update, 0 for none
    pub ripple_to: i16,
    pub mf_type: MfType,
    pub length: u16,
    pub enum_length: u8,
    pub rwf_type: DataType,
    pub rwf_length: u16,
}

/// Display values for the enumerated fields listed in `fids`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnumTable {
    pub fids: Vec<i16>,
    pub values: BTreeMap<u16, String>,
}

/// Version tags and dictionary id carried in dictionary headers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DictionaryInfo {
    pub dictionary_id: i64,
    pub field_version: String,
    pub enum_rt_version: String,
    pub enum_dt_version: String,
}

/// Field definitions plus enum tables
#[derive(Debug, Clone, Default)]
pub struct DataDictionary {
    info: DictionaryInfo,
    fields: BTreeMap<i16, FieldDef>,
    by_acronym: HashMap<String, i16>,
    enum_tables: Vec<EnumTable>,
    enum_by_fid: HashMap<i16, usize>,
}

impl DataDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> &DictionaryInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut DictionaryInfo {
        &mut self.info
    }

    /// Add a field definition; fid 0 and duplicate fids are rejected
    pub fn add_field(&mut self, field: FieldDef) -> CodecResult<()> {
        if field.fid == 0 {
            return Err(CodecError::dictionary_payload("fid 0 is reserved"));
        }
        if let Some(existing) = self.fields.get(&field.fid) {
            if existing != &field {
                return Err(CodecError::dictionary_payload(format!(
                    "duplicate definition for fid {} ({} / {})",
                    field.fid, existing.acronym, field.acronym
                )));
            }
            return Ok(());
        }
        self.by_acronym.insert(field.acronym.clone(), field.fid);
        self.fields.insert(field.fid, field);
        Ok(())
    }

    /// Add an enum table and link it to each of its fids
    pub fn add_enum_table(&mut self, table: EnumTable) -> CodecResult<()> {
        if let Some(fid) = table.fids.iter().find(|fid| self.enum_by_fid.contains_key(fid)) {
            return Err(CodecError::dictionary_payload(format!(
                "fid {fid} already has an enum table"
            )));
        }
        let index = self.enum_tables.len();
        for fid in &table.fids {
            self.enum_by_fid.insert(*fid, index);
        }
        self.enum_tables.push(table);
        Ok(())
    }

    pub fn field(&self, fid: i16) -> Option<&FieldDef> {
        self.fields.get(&fid)
    }

    pub fn field_by_name(&self, acronym: &str) -> Option<&FieldDef> {
        self.by_acronym.get(acronym).and_then(|fid| self.fields.get(fid))
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    pub fn enum_tables(&self) -> &[EnumTable] {
        &self.enum_tables
    }

    pub fn enum_table(&self, fid: i16) -> Option<&EnumTable> {
        self.enum_by_fid.get(&fid).map(|index| &self.enum_tables[*index])
    }

    /// Display string of an enumerated value
    pub fn enum_display(&self, fid: i16, value: u16) -> Option<&str> {
        self.enum_table(fid)
            .and_then(|table| table.values.get(&value))
            .map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn has_enum_tables(&self) -> bool {
        !self.enum_tables.is_empty()
    }

    /// Both halves loaded
    pub fn is_complete(&self) -> bool {
        self.has_fields() && self.has_enum_tables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid() -> FieldDef {
        FieldDef {
            fid: 22,
            acronym: "BID".into(),
            dde_acronym: "BID".into(),
            ripple_to: 24,
            mf_type: MfType::Price,
            length: 17,
            enum_length: 0,
            rwf_type: DataType::Real,
            rwf_length: 7,
        }
    }

    #[test]
    fn lookup_by_fid_and_acronym() {
        let mut dictionary = DataDictionary::new();
        dictionary.add_field(bid()).unwrap();
        assert_eq!(dictionary.field(22).unwrap().acronym, "BID");
        assert_eq!(dictionary.field_by_name("BID").unwrap().fid, 22);
        assert!(dictionary.field(23).is_none());
    }

    #[test]
    fn conflicting_duplicate_is_rejected() {
        let mut dictionary = DataDictionary::new();
        dictionary.add_field(bid()).unwrap();
        dictionary.add_field(bid()).unwrap();
        let mut other = bid();
        other.acronym = "ASK".into();
        assert!(dictionary.add_field(other).is_err());
    }

    #[test]
    fn enum_display_lookup() {
        let mut dictionary = DataDictionary::new();
        let mut table = EnumTable {
            fids: vec![4, 14],
            ..EnumTable::default()
        };
        table.values.insert(1, "UP".into());
        dictionary.add_enum_table(table).unwrap();
        assert_eq!(dictionary.enum_display(14, 1), Some("UP"));
        assert_eq!(dictionary.enum_display(14, 2), None);
        assert!(dictionary
            .add_enum_table(EnumTable {
                fids: vec![4],
                ..EnumTable::default()
            })
            .is_err());
    }

    #[test]
    fn mf_type_codes_are_stable() {
        for code in -2..=9 {
            assert_eq!(MfType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(MfType::from_name("ENUMERATED"), Some(MfType::Enumerated));
    }
}
