//! `RDMFieldDictionary` and `enumtype.def` text formats
//!
//! Field dictionary rows, one per field, columns separated by whitespace:
//!
//! ```text
//! !ACRONYM    DDE ACRONYM          FID  RIPPLES TO  FIELD TYPE     LENGTH  RWF TYPE   RWF LEN
//! BID        "BID"                  22  BID_1       PRICE              17  REAL64           7
//! PRCTCK_1   "TICK"                 14  NULL        ENUMERATED    3 ( 1 )  ENUM             1
//! ```
//!
//! Enum type rows: one or more `ACRONYM FID` lines followed by the value table
//! they share. Display values are quoted text or `#hex#` bytes.
//!
//! ```text
//! PRCTCK_1      14
//!       0      " "            no tick
//!       1      #DE#           up tick
//! ```
//!
//! Lines starting with `!` are comments, except `!tag Name Value` headers.

use super::{DataDictionary, EnumTable, FieldDef, MfType};
use crate::error::{CodecError, CodecResult};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use types::DataType;

#[derive(Debug, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(other) => text.push(other),
                    None => return Err("unterminated quoted string".into()),
                }
            }
            tokens.push(Token { text, quoted: true });
        } else if c == '(' || c == ')' {
            chars.next();
            tokens.push(Token {
                text: c.to_string(),
                quoted: false,
            });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token { text, quoted: false });
        }
    }
    Ok(tokens)
}

/// `!tag Name Value` header, if this line is one
fn tag(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("!tag")?;
    let mut parts = rest.trim().splitn(2, char::is_whitespace);
    let name = parts.next().filter(|name| !name.is_empty())?;
    Some((name, parts.next().unwrap_or("").trim()))
}

/// Wire type for a dictionary RWF type name; width suffixes such as `64` are ignored
pub fn rwf_type_from_name(name: &str) -> Option<DataType> {
    let base = name.trim_end_matches(|c: char| c.is_ascii_digit());
    Some(match base {
        "INT" => DataType::Int,
        "UINT" => DataType::UInt,
        "REAL" => DataType::Real,
        "FLOAT" => DataType::Float,
        "DOUBLE" => DataType::Double,
        "DATE" => DataType::Date,
        "TIME" => DataType::Time,
        "DATETIME" | "DATE_TIME" => DataType::DateTime,
        "QOS" => DataType::Qos,
        "STATE" | "STATUS" => DataType::State,
        "ENUM" => DataType::Enum,
        "ARRAY" => DataType::Array,
        "BUFFER" => DataType::Buffer,
        "ASCII_STRING" => DataType::AsciiString,
        "UTF8_STRING" => DataType::Utf8String,
        "RMTES_STRING" => DataType::RmtesString,
        "FIELD_LIST" => DataType::FieldList,
        "ELEMENT_LIST" | "ELEM_LIST" => DataType::ElementList,
        "FILTER_LIST" => DataType::FilterList,
        "MAP" => DataType::Map,
        "SERIES" => DataType::Series,
        "OPAQUE" => DataType::Opaque,
        "XML" => DataType::Xml,
        "MSG" => DataType::Msg,
        _ => return None,
    })
}

fn number<T: std::str::FromStr>(token: Option<&Token>, what: &str) -> Result<T, String> {
    let token = token.ok_or_else(|| format!("missing {what}"))?;
    token
        .text
        .parse()
        .map_err(|_| format!("invalid {what} '{}'", token.text))
}

fn word<'t>(token: Option<&'t Token>, what: &str) -> Result<&'t str, String> {
    token
        .map(|token| token.text.as_str())
        .ok_or_else(|| format!("missing {what}"))
}

/// A parsed field row whose ripple target is still an acronym
struct FieldRow {
    def: FieldDef,
    ripple_acronym: Option<String>,
}

fn field_row(line: &str) -> Result<FieldRow, String> {
    let tokens = tokenize(line)?;
    let mut it = tokens.iter();
    let acronym = word(it.next(), "acronym")?.to_string();
    let dde_acronym = word(it.next(), "DDE acronym")?.to_string();
    let fid: i16 = number(it.next(), "fid")?;
    let ripple = word(it.next(), "ripples-to")?;
    let ripple_acronym = (ripple != "NULL").then(|| ripple.to_string());
    let mf_name = word(it.next(), "field type")?;
    let mf_type = MfType::from_name(mf_name).ok_or_else(|| format!("unknown field type '{mf_name}'"))?;
    let length: u16 = number(it.next(), "length")?;

    let mut next = it.next();
    let mut enum_length = 0u8;
    if next.map(|token| token.text.as_str()) == Some("(") {
        enum_length = number(it.next(), "enum length")?;
        if word(it.next(), "')'")? != ")" {
            return Err("expected ')' after enum length".into());
        }
        next = it.next();
    }
    let rwf_name = word(next, "RWF type")?;
    let rwf_type = rwf_type_from_name(rwf_name).ok_or_else(|| format!("illegal RWF type '{rwf_name}'"))?;
    let rwf_length: u16 = number(it.next(), "RWF length")?;

    Ok(FieldRow {
        def: FieldDef {
            fid,
            acronym,
            dde_acronym,
            ripple_to: 0,
            mf_type,
            length,
            enum_length,
            rwf_type,
            rwf_length,
        },
        ripple_acronym,
    })
}

/// Parse field dictionary text into `dictionary`
pub fn parse_field_dictionary(
    source_name: &str,
    content: &str,
    dictionary: &mut DataDictionary,
) -> CodecResult<()> {
    let mut rows = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line_num = index + 1;
        let line = raw.trim();
        if let Some((name, value)) = tag(line) {
            match name {
                "Version" => dictionary.info_mut().field_version = value.to_string(),
                "DictionaryId" => {
                    dictionary.info_mut().dictionary_id = value.parse().map_err(|_| {
                        CodecError::dictionary_parse(source_name, line_num, format!("invalid DictionaryId '{value}'"))
                    })?
                }
                _ => {}
            }
            continue;
        }
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        let row = field_row(line).map_err(|reason| CodecError::dictionary_parse(source_name, line_num, reason))?;
        rows.push((line_num, row));
    }

    let fids_by_acronym: BTreeMap<&str, i16> = rows
        .iter()
        .map(|(_, row)| (row.def.acronym.as_str(), row.def.fid))
        .collect();
    let mut resolved = Vec::with_capacity(rows.len());
    for (line_num, row) in &rows {
        let mut def = row.def.clone();
        if let Some(target) = &row.ripple_acronym {
            // Unknown ripple targets are left unlinked
            def.ripple_to = fids_by_acronym.get(target.as_str()).copied().unwrap_or(0);
        }
        resolved.push((*line_num, def));
    }
    let count = resolved.len();
    for (line_num, def) in resolved {
        dictionary.add_field(def).map_err(|err| {
            CodecError::dictionary_parse(source_name, line_num, err.to_string())
        })?;
    }
    debug!(source = source_name, fields = count, "Field dictionary parsed");
    Ok(())
}

fn display_value(token: &Token) -> Result<String, String> {
    if token.quoted {
        return Ok(token.text.clone());
    }
    let hex = token
        .text
        .strip_prefix('#')
        .and_then(|rest| rest.strip_suffix('#'))
        .ok_or_else(|| format!("display '{}' is neither quoted nor #hex#", token.text))?;
    if hex.len() % 2 != 0 {
        return Err(format!("odd-length hex display '{}'", token.text));
    }
    let bytes = (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| format!("invalid hex display '{}'", token.text))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse enum type text into `dictionary`
pub fn parse_enum_types(
    source_name: &str,
    content: &str,
    dictionary: &mut DataDictionary,
) -> CodecResult<()> {
    let mut current = EnumTable::default();
    let mut in_values = false;
    let mut tables = 0usize;

    let mut flush = |table: &mut EnumTable, dictionary: &mut DataDictionary, line_num: usize| {
        let table = std::mem::take(table);
        if table.fids.is_empty() {
            return Ok(());
        }
        tables += 1;
        dictionary
            .add_enum_table(table)
            .map_err(|err| CodecError::dictionary_parse(source_name, line_num, err.to_string()))
    };

    let mut last_line = 0;
    for (index, raw) in content.lines().enumerate() {
        let line_num = index + 1;
        last_line = line_num;
        let line = raw.trim();
        if let Some((name, value)) = tag(line) {
            match name {
                "RT_Version" => dictionary.info_mut().enum_rt_version = value.to_string(),
                "DT_Version" => dictionary.info_mut().enum_dt_version = value.to_string(),
                _ => {}
            }
            continue;
        }
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        let parse_err = |reason: String| CodecError::dictionary_parse(source_name, line_num, reason);
        if line.starts_with('"') {
            return Err(parse_err("missing keyword".into()));
        }
        let tokens = tokenize(line).map_err(parse_err)?;
        let starts_with_digit = line.starts_with(|c: char| c.is_ascii_digit() || c == '-');

        if starts_with_digit {
            if current.fids.is_empty() {
                return Err(parse_err("enum value before any field acronym".into()));
            }
            in_values = true;
            let value: i64 = number(tokens.first(), "enum value").map_err(parse_err)?;
            let value = u16::try_from(value).map_err(|_| parse_err(format!("enum value {value} out of range")))?;
            let display = tokens
                .get(1)
                .ok_or_else(|| "missing display".to_string())
                .and_then(display_value)
                .map_err(parse_err)?;
            if current.values.insert(value, display).is_some() {
                return Err(parse_err(format!("duplicate enum value {value}")));
            }
        } else {
            if in_values {
                flush(&mut current, dictionary, line_num)?;
                in_values = false;
            }
            let fid: i16 = number(tokens.get(1), "fid").map_err(parse_err)?;
            if let Some(field) = dictionary.field(fid) {
                if field.acronym != tokens[0].text {
                    return Err(parse_err(format!(
                        "acronym {} does not match field {} ({})",
                        tokens[0].text, fid, field.acronym
                    )));
                }
            }
            current.fids.push(fid);
        }
    }
    flush(&mut current, dictionary, last_line)?;
    debug!(source = source_name, tables, "Enum type dictionary parsed");
    Ok(())
}

fn read_file(path: &Path) -> CodecResult<String> {
    std::fs::read_to_string(path).map_err(|err| {
        CodecError::dictionary_parse(path.display().to_string(), 0, format!("cannot read file: {err}"))
    })
}

impl DataDictionary {
    /// Load both dictionary files
    pub fn load_files(field_path: impl AsRef<Path>, enum_path: impl AsRef<Path>) -> CodecResult<Self> {
        let mut dictionary = Self::new();
        dictionary.load_field_file(field_path)?;
        dictionary.load_enum_file(enum_path)?;
        Ok(dictionary)
    }

    pub fn load_field_file(&mut self, path: impl AsRef<Path>) -> CodecResult<()> {
        let path = path.as_ref();
        parse_field_dictionary(&path.display().to_string(), &read_file(path)?, self)
    }

    pub fn load_enum_file(&mut self, path: impl AsRef<Path>) -> CodecResult<()> {
        let path = path.as_ref();
        parse_enum_types(&path.display().to_string(), &read_file(path)?, self)
    }
}
