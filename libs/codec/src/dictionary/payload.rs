//! Dictionary-domain payloads (`RWFFld` / `RWFEnum`)
//!
//! Both dictionaries travel as a [`Series`] of [`ElementList`] rows. The series
//! summary names the dictionary type and version:
//!
//! ```text
//! RWFFld:  summary { Type=1 Version DictionaryId }
//!          row     { NAME FID RIPPLETO TYPE LENGTH RWFTYPE RWFLEN [ENUMLENGTH] [LONGNAME] }
//! RWFEnum: summary { Type=2 Version DT_Version DictionaryId }
//!          row     { FIDS:Array<Int> VALUE:Array<Enum> DISPLAY:Array<Ascii> }
//! ```
//!
//! Multi-part refreshes are applied one part at a time into the same
//! [`DataDictionary`].

use super::{DataDictionary, EnumTable, FieldDef, MfType};
use crate::error::{CodecError, CodecResult};
use types::rdm::names;
use types::{Data, DataType, ElementList, OmmArray, Series};

/// Name a consumer requests for field definitions
pub const FIELD_DICTIONARY_NAME: &str = "RWFFld";
/// Name a consumer requests for enum tables
pub const ENUM_DICTIONARY_NAME: &str = "RWFEnum";

pub const TYPE_FIELD_DEFINITIONS: u64 = 1;
pub const TYPE_ENUM_TABLES: u64 = 2;

const NAME: &str = "NAME";
const FID: &str = "FID";
const RIPPLETO: &str = "RIPPLETO";
const TYPE: &str = "TYPE";
const LENGTH: &str = "LENGTH";
const RWFTYPE: &str = "RWFTYPE";
const RWFLEN: &str = "RWFLEN";
const ENUMLENGTH: &str = "ENUMLENGTH";
const LONGNAME: &str = "LONGNAME";
const FIDS: &str = "FIDS";
const VALUE: &str = "VALUE";
const DISPLAY: &str = "DISPLAY";
const DT_VERSION: &str = "DT_Version";

/// How much of each field definition a dictionary refresh carries
///
/// Carried in the request key filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Minimal = 0x3,
    #[default]
    Normal = 0x7,
    Verbose = 0xF,
}

impl Verbosity {
    pub fn filter(self) -> u32 {
        self as u32
    }

    pub fn from_filter(filter: u32) -> Self {
        if filter & 0x8 != 0 {
            Verbosity::Verbose
        } else if filter & 0x4 != 0 {
            Verbosity::Normal
        } else {
            Verbosity::Minimal
        }
    }
}

/// Which dictionary a payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryKind {
    FieldDefinitions,
    EnumTables,
}

impl DictionaryKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            FIELD_DICTIONARY_NAME => Some(DictionaryKind::FieldDefinitions),
            ENUM_DICTIONARY_NAME => Some(DictionaryKind::EnumTables),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DictionaryKind::FieldDefinitions => FIELD_DICTIONARY_NAME,
            DictionaryKind::EnumTables => ENUM_DICTIONARY_NAME,
        }
    }
}

fn series_of(data: &Data) -> CodecResult<&Series> {
    data.as_series()
        .ok_or_else(|| CodecError::dictionary_payload(format!("expected Series, got {:?}", data.data_type())))
}

fn element_i64(list: &ElementList, name: &'static str) -> CodecResult<i64> {
    list.get(name)
        .and_then(Data::as_i64)
        .ok_or_else(|| CodecError::dictionary_payload(format!("missing integer element {name}")))
}

fn element_str(list: &ElementList, name: &'static str) -> Option<String> {
    match list.get(name) {
        Some(Data::Rmtes(text)) => Some(text.to_string_lossy()),
        Some(other) => other.as_str().map(str::to_string),
        None => None,
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, name: &'static str) -> CodecResult<T> {
    T::try_from(value).map_err(|_| CodecError::dictionary_payload(format!("{name} value {value} out of range")))
}

/// Kind named by the payload's summary, if it has one
pub fn payload_kind(data: &Data) -> Option<DictionaryKind> {
    let summary = data.as_series()?.summary()?.as_element_list()?;
    match summary.get(names::DICT_TYPE)?.as_u64()? {
        TYPE_FIELD_DEFINITIONS => Some(DictionaryKind::FieldDefinitions),
        TYPE_ENUM_TABLES => Some(DictionaryKind::EnumTables),
        _ => None,
    }
}

fn summary(kind: u64, dictionary: &DataDictionary) -> CodecResult<ElementList> {
    let info = dictionary.info();
    let mut summary = ElementList::new();
    summary.add_uint(names::DICT_TYPE, kind)?;
    if kind == TYPE_FIELD_DEFINITIONS {
        summary.add_ascii(names::DICT_VERSION, info.field_version.clone())?;
    } else {
        summary.add_ascii(names::DICT_VERSION, info.enum_rt_version.clone())?;
        summary.add_ascii(DT_VERSION, info.enum_dt_version.clone())?;
    }
    summary.add_int(names::DICTIONARY_ID, info.dictionary_id)?;
    summary.complete()?;
    Ok(summary)
}

/// Encode the field definitions as an `RWFFld` refresh payload
pub fn encode_field_dictionary(dictionary: &DataDictionary, verbosity: Verbosity) -> CodecResult<Data> {
    let mut series = Series::new();
    series.summary_data(summary(TYPE_FIELD_DEFINITIONS, dictionary)?)?;
    for field in dictionary.fields() {
        let mut row = ElementList::new();
        row.add_ascii(NAME, field.acronym.clone())?
            .add_int(FID, field.fid as i64)?
            .add_int(RIPPLETO, field.ripple_to as i64)?
            .add_int(TYPE, field.mf_type.code())?
            .add_uint(LENGTH, field.length as u64)?
            .add_uint(RWFTYPE, field.rwf_type as u64)?
            .add_uint(RWFLEN, field.rwf_length as u64)?;
        if verbosity >= Verbosity::Normal {
            row.add_uint(ENUMLENGTH, field.enum_length as u64)?;
        }
        if verbosity >= Verbosity::Verbose {
            row.add_ascii(LONGNAME, field.dde_acronym.clone())?;
        }
        row.complete()?;
        series.add_entry(row)?;
    }
    if dictionary.field_count() == 0 {
        return Err(CodecError::dictionary_payload("no field definitions to encode"));
    }
    series.complete()?;
    Ok(Data::Series(series))
}

/// Encode the enum tables as an `RWFEnum` refresh payload
pub fn encode_enum_tables(dictionary: &DataDictionary) -> CodecResult<Data> {
    if !dictionary.has_enum_tables() {
        return Err(CodecError::dictionary_payload("no enum tables to encode"));
    }
    let mut series = Series::new();
    series.summary_data(summary(TYPE_ENUM_TABLES, dictionary)?)?;
    for table in dictionary.enum_tables() {
        let mut fids = OmmArray::new(DataType::Int);
        for fid in &table.fids {
            fids.add_int(*fid as i64)?;
        }
        fids.complete()?;
        let mut values = OmmArray::new(DataType::Enum);
        let mut displays = OmmArray::new(DataType::AsciiString);
        for (value, display) in &table.values {
            values.add_enum(*value)?;
            displays.add_ascii(display.clone())?;
        }
        values.complete()?;
        displays.complete()?;

        let mut row = ElementList::new();
        row.add_entry(FIDS, fids)?
            .add_entry(VALUE, values)?
            .add_entry(DISPLAY, displays)?;
        row.complete()?;
        series.add_entry(row)?;
    }
    series.complete()?;
    Ok(Data::Series(series))
}

fn apply_summary(series: &Series, dictionary: &mut DataDictionary, kind: DictionaryKind) {
    let Some(summary) = series.summary().and_then(Data::as_element_list) else {
        return;
    };
    let info = dictionary.info_mut();
    if let Some(id) = summary.get(names::DICTIONARY_ID).and_then(Data::as_i64) {
        info.dictionary_id = id;
    }
    match kind {
        DictionaryKind::FieldDefinitions => {
            if let Some(version) = element_str(summary, names::DICT_VERSION) {
                info.field_version = version;
            }
        }
        DictionaryKind::EnumTables => {
            if let Some(version) = element_str(summary, names::DICT_VERSION) {
                info.enum_rt_version = version;
            }
            if let Some(version) = element_str(summary, DT_VERSION) {
                info.enum_dt_version = version;
            }
        }
    }
}

/// Add the field definitions of one `RWFFld` refresh part to `dictionary`
pub fn apply_field_payload(dictionary: &mut DataDictionary, data: &Data) -> CodecResult<usize> {
    let series = series_of(data)?;
    apply_summary(series, dictionary, DictionaryKind::FieldDefinitions);
    let mut added = 0;
    for entry in series.entries() {
        let row = entry
            .as_element_list()
            .ok_or_else(|| CodecError::dictionary_payload("field row is not an ElementList"))?;
        let acronym = element_str(row, NAME)
            .ok_or_else(|| CodecError::dictionary_payload("field row without NAME"))?;
        let mf_code = element_i64(row, TYPE)?;
        let rwf_code = element_i64(row, RWFTYPE)?;
        let rwf_type = u8::try_from(rwf_code)
            .ok()
            .and_then(|code| DataType::try_from(code).ok())
            .ok_or_else(|| CodecError::dictionary_payload(format!("unknown RWFTYPE {rwf_code}")))?;
        let field = FieldDef {
            fid: narrow(element_i64(row, FID)?, FID)?,
            dde_acronym: element_str(row, LONGNAME).unwrap_or_else(|| acronym.clone()),
            acronym,
            ripple_to: narrow(element_i64(row, RIPPLETO)?, RIPPLETO)?,
            mf_type: MfType::from_code(mf_code)
                .ok_or_else(|| CodecError::dictionary_payload(format!("unknown field TYPE {mf_code}")))?,
            length: narrow(element_i64(row, LENGTH)?, LENGTH)?,
            enum_length: match row.get(ENUMLENGTH).and_then(Data::as_i64) {
                Some(value) => narrow(value, ENUMLENGTH)?,
                None => 0,
            },
            rwf_type,
            rwf_length: narrow(element_i64(row, RWFLEN)?, RWFLEN)?,
        };
        dictionary.add_field(field)?;
        added += 1;
    }
    Ok(added)
}

fn array_element<'a>(row: &'a ElementList, name: &'static str) -> CodecResult<&'a OmmArray> {
    row.get(name)
        .and_then(Data::as_array)
        .ok_or_else(|| CodecError::dictionary_payload(format!("enum row without {name} array")))
}

/// Add the enum tables of one `RWFEnum` refresh part to `dictionary`
pub fn apply_enum_payload(dictionary: &mut DataDictionary, data: &Data) -> CodecResult<usize> {
    let series = series_of(data)?;
    apply_summary(series, dictionary, DictionaryKind::EnumTables);
    let mut added = 0;
    for entry in series.entries() {
        let row = entry
            .as_element_list()
            .ok_or_else(|| CodecError::dictionary_payload("enum row is not an ElementList"))?;
        let fids = array_element(row, FIDS)?
            .items()
            .iter()
            .map(|item| {
                item.as_i64()
                    .ok_or_else(|| CodecError::dictionary_payload("non-integer fid"))
                    .and_then(|fid| narrow(fid, FIDS))
            })
            .collect::<CodecResult<Vec<i16>>>()?;
        let values = array_element(row, VALUE)?.items();
        let displays = array_element(row, DISPLAY)?.items();
        if values.len() != displays.len() {
            return Err(CodecError::dictionary_payload(format!(
                "{} enum values but {} displays",
                values.len(),
                displays.len()
            )));
        }
        let mut table = EnumTable {
            fids,
            ..EnumTable::default()
        };
        for (value, display) in values.iter().zip(displays) {
            let value = value
                .as_u64()
                .and_then(|value| u16::try_from(value).ok())
                .ok_or_else(|| CodecError::dictionary_payload("enum value is not an Enum"))?;
            let display = match display {
                Data::Blank(_) => String::new(),
                Data::Rmtes(text) => text.to_string_lossy(),
                other => other
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| CodecError::dictionary_payload("enum display is not text"))?,
            };
            table.values.insert(value, display);
        }
        dictionary.add_enum_table(table)?;
        added += 1;
    }
    Ok(added)
}

/// Apply either kind of dictionary payload, dispatching on its summary
pub fn apply_payload(dictionary: &mut DataDictionary, data: &Data) -> CodecResult<DictionaryKind> {
    let kind = payload_kind(data)
        .ok_or_else(|| CodecError::dictionary_payload("summary does not name a dictionary type"))?;
    match kind {
        DictionaryKind::FieldDefinitions => apply_field_payload(dictionary, data)?,
        DictionaryKind::EnumTables => apply_enum_payload(dictionary, data)?,
    };
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::text::{parse_enum_types, parse_field_dictionary};

    fn sample() -> DataDictionary {
        let mut dictionary = DataDictionary::new();
        parse_field_dictionary(
            "fields",
            "!tag Version 4.20.29\n\
             PRCTCK_1 \"TICK\" 14 NULL ENUMERATED 1 ( 1 ) ENUM 1\n\
             BID \"BID\" 22 NULL PRICE 17 REAL64 7\n",
            &mut dictionary,
        )
        .unwrap();
        parse_enum_types(
            "enums",
            "!tag RT_Version 4.20.29\nPRCTCK_1 14\n 0 \" \" none\n 1 #DE# up\n",
            &mut dictionary,
        )
        .unwrap();
        dictionary
    }

    #[test]
    fn field_payload_rebuilds_definitions() {
        let source = sample();
        let payload = encode_field_dictionary(&source, Verbosity::Verbose).unwrap();
        assert_eq!(payload_kind(&payload), Some(DictionaryKind::FieldDefinitions));

        let mut rebuilt = DataDictionary::new();
        assert_eq!(apply_field_payload(&mut rebuilt, &payload).unwrap(), 2);
        assert_eq!(rebuilt.field(22), source.field(22));
        assert_eq!(rebuilt.field(14).unwrap().enum_length, 1);
        assert_eq!(rebuilt.info().field_version, "4.20.29");
    }

    #[test]
    fn minimal_verbosity_omits_long_names() {
        let payload = encode_field_dictionary(&sample(), Verbosity::Minimal).unwrap();
        let mut rebuilt = DataDictionary::new();
        apply_field_payload(&mut rebuilt, &payload).unwrap();
        assert_eq!(rebuilt.field(14).unwrap().dde_acronym, "PRCTCK_1");
        assert_eq!(rebuilt.field(14).unwrap().enum_length, 0);
    }

    #[test]
    fn enum_payload_rebuilds_tables() {
        let source = sample();
        let payload = encode_enum_tables(&source).unwrap();
        let mut rebuilt = DataDictionary::new();
        assert_eq!(apply_payload(&mut rebuilt, &payload).unwrap(), DictionaryKind::EnumTables);
        assert_eq!(rebuilt.enum_display(14, 1), source.enum_display(14, 1));
        assert_eq!(rebuilt.info().enum_rt_version, "4.20.29");
    }

    #[test]
    fn verbosity_from_request_filter() {
        assert_eq!(Verbosity::from_filter(0x7), Verbosity::Normal);
        assert_eq!(Verbosity::from_filter(0xF), Verbosity::Verbose);
        assert_eq!(Verbosity::from_filter(0x3), Verbosity::Minimal);
    }

    #[test]
    fn non_series_payload_is_rejected() {
        let mut dictionary = DataDictionary::new();
        assert!(apply_field_payload(&mut dictionary, &Data::UInt(1)).is_err());
        assert!(apply_payload(&mut dictionary, &Data::NoData).is_err());
    }
}
