//! Primitive content encodings
//!
//! Functions here write or read the *content* of one primitive; the caller
//! supplies the surrounding length. Zero-length content is a blank value.
//!
//! | Type | Content |
//! |------|---------|
//! | Int / UInt | minimal big-endian two's complement / unsigned, 1-8 bytes |
//! | Float / Double | IEEE-754 big-endian, 4 / 8 bytes |
//! | Real | hint byte, then minimal mantissa (absent for special hints) |
//! | Date | year `u16`, month, day |
//! | Time | h, m, s \[, ms `u16` \[, µs `u16` \[, ns `u16`\]\]\] |
//! | DateTime | Date then Time |
//! | Enum | `u16` |
//! | Qos | rate/timeliness byte, optional delay `u16`, optional rate `u16` |
//! | State | stream state, data state, code, length-prefixed text |
//! | strings, buffers | raw bytes |

use crate::constants::REAL_HINT_MASK;
use crate::error::{CodecError, CodecResult};
use crate::reader::{put_length_prefixed, WireReader};
use bytes::{BufMut, Bytes, BytesMut};
use types::{
    DataState, DataType, Date, DateTime, Qos, Rate, Real, RealHint, RmtesBuffer, State,
    StatusCode, StreamState, Time, Timeliness,
};
use types::Data;

const QOS_DYNAMIC: u8 = 0x01;

/// Minimal big-endian two's complement bytes for `value`
pub fn int_bytes(value: i64) -> Vec<u8> {
    let full = value.to_be_bytes();
    let mut start = 0;
    // Drop leading bytes that only repeat the sign of the next byte
    while start < 7 {
        let byte = full[start];
        let next_negative = full[start + 1] & 0x80 != 0;
        if (byte == 0x00 && !next_negative) || (byte == 0xFF && next_negative) {
            start += 1;
        } else {
            break;
        }
    }
    full[start..].to_vec()
}

/// Minimal big-endian unsigned bytes for `value` (at least one byte)
pub fn uint_bytes(value: u64) -> Vec<u8> {
    let full = value.to_be_bytes();
    let start = full.iter().position(|b| *b != 0).unwrap_or(7);
    full[start..].to_vec()
}

pub fn read_int(content: &[u8], offset: usize) -> CodecResult<i64> {
    if content.is_empty() || content.len() > 8 {
        return Err(CodecError::invalid_content(
            DataType::Int,
            offset,
            format!("{} bytes", content.len()),
        ));
    }
    let fill = if content[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut full = [fill; 8];
    full[8 - content.len()..].copy_from_slice(content);
    Ok(i64::from_be_bytes(full))
}

pub fn read_uint(content: &[u8], offset: usize) -> CodecResult<u64> {
    if content.is_empty() || content.len() > 8 {
        return Err(CodecError::invalid_content(
            DataType::UInt,
            offset,
            format!("{} bytes", content.len()),
        ));
    }
    let mut full = [0u8; 8];
    full[8 - content.len()..].copy_from_slice(content);
    Ok(u64::from_be_bytes(full))
}

fn put_time(out: &mut BytesMut, time: &Time) {
    out.put_u8(time.hour());
    out.put_u8(time.minute());
    out.put_u8(time.second());
    if time.millisecond() != 0 || time.microsecond() != 0 || time.nanosecond() != 0 {
        out.put_u16(time.millisecond());
        if time.microsecond() != 0 || time.nanosecond() != 0 {
            out.put_u16(time.microsecond());
            if time.nanosecond() != 0 {
                out.put_u16(time.nanosecond());
            }
        }
    }
}

fn put_date(out: &mut BytesMut, date: &Date) {
    out.put_u16(date.year());
    out.put_u8(date.month());
    out.put_u8(date.day());
}

fn put_qos(out: &mut BytesMut, qos: &Qos) {
    let timeliness: u8 = match qos.timeliness {
        Timeliness::RealTime => 0,
        Timeliness::DelayedUnknown => 1,
        Timeliness::Delayed(_) => 2,
    };
    let rate: u8 = match qos.rate {
        Rate::TickByTick => 0,
        Rate::JitConflated => 1,
        Rate::TimeConflated(_) => 2,
    };
    let dynamic = if qos.dynamic { QOS_DYNAMIC } else { 0 };
    out.put_u8((timeliness << 5) | (rate << 1) | dynamic);
    if let Timeliness::Delayed(secs) = qos.timeliness {
        out.put_u16(secs);
    }
    if let Rate::TimeConflated(ms) = qos.rate {
        out.put_u16(ms);
    }
}

fn put_state(out: &mut BytesMut, state: &State) -> CodecResult<()> {
    out.put_u8(state.stream_state as u8);
    out.put_u8(state.data_state as u8);
    out.put_u8(state.code.0);
    put_length_prefixed(out, state.text.as_bytes())
}

/// Write the content of a primitive value
pub fn encode_primitive(data: &Data, out: &mut BytesMut) -> CodecResult<()> {
    match data {
        Data::Blank(data_type) if data_type.is_primitive() && *data_type != DataType::Array => {}
        Data::Int(value) => out.put_slice(&int_bytes(*value)),
        Data::UInt(value) => out.put_slice(&uint_bytes(*value)),
        Data::Float(value) => out.put_f32(*value),
        Data::Double(value) => out.put_f64(*value),
        Data::Real(real) => {
            out.put_u8(real.hint() as u8);
            if !real.hint().is_special() {
                out.put_slice(&int_bytes(real.mantissa()));
            }
        }
        Data::Date(date) => put_date(out, date),
        Data::Time(time) => put_time(out, time),
        Data::DateTime(value) => {
            put_date(out, &value.date);
            put_time(out, &value.time);
        }
        Data::Qos(qos) => put_qos(out, qos),
        Data::State(state) => put_state(out, state)?,
        Data::Enum(value) => out.put_u16(*value),
        Data::Buffer(bytes) => out.put_slice(bytes),
        Data::Ascii(text) | Data::Utf8(text) => out.put_slice(text.as_bytes()),
        Data::Rmtes(text) => out.put_slice(text.as_bytes()),
        other => {
            return Err(CodecError::invalid_content(
                other.data_type(),
                0,
                "not a primitive value",
            ))
        }
    }
    Ok(())
}

fn read_time(reader: &mut WireReader<'_>, data_type: DataType) -> CodecResult<Time> {
    let offset = reader.offset();
    let (hour, minute, second) = (reader.u8("time")?, reader.u8("time")?, reader.u8("time")?);
    let millisecond = if reader.is_empty() { 0 } else { reader.u16("time")? };
    let microsecond = if reader.is_empty() { 0 } else { reader.u16("time")? };
    let nanosecond = if reader.is_empty() { 0 } else { reader.u16("time")? };
    Time::with_nanos(hour, minute, second, millisecond, microsecond, nanosecond)
        .map_err(|err| CodecError::invalid_content(data_type, offset, err.to_string()))
}

fn read_date(reader: &mut WireReader<'_>, data_type: DataType) -> CodecResult<Date> {
    let offset = reader.offset();
    let year = reader.u16("date")?;
    let month = reader.u8("date")?;
    let day = reader.u8("date")?;
    Date::new(year, month, day)
        .map_err(|err| CodecError::invalid_content(data_type, offset, err.to_string()))
}

fn read_qos(reader: &mut WireReader<'_>) -> CodecResult<Qos> {
    let offset = reader.offset();
    let head = reader.u8("qos")?;
    let timeliness = match head >> 5 {
        0 => Timeliness::RealTime,
        1 => Timeliness::DelayedUnknown,
        2 => Timeliness::Delayed(reader.u16("qos delay")?),
        other => {
            return Err(CodecError::invalid_content(
                DataType::Qos,
                offset,
                format!("timeliness code {other}"),
            ))
        }
    };
    let rate = match (head >> 1) & 0x0F {
        0 => Rate::TickByTick,
        1 => Rate::JitConflated,
        2 => Rate::TimeConflated(reader.u16("qos rate")?),
        other => {
            return Err(CodecError::invalid_content(
                DataType::Qos,
                offset,
                format!("rate code {other}"),
            ))
        }
    };
    Ok(Qos {
        timeliness,
        rate,
        dynamic: head & QOS_DYNAMIC != 0,
    })
}

pub fn read_state(reader: &mut WireReader<'_>) -> CodecResult<State> {
    let offset = reader.offset();
    let stream_state = StreamState::try_from(reader.u8("state")?).map_err(|err| {
        CodecError::invalid_content(DataType::State, offset, format!("stream state {}", err.number))
    })?;
    let data_state = DataState::try_from(reader.u8("state")?).map_err(|err| {
        CodecError::invalid_content(DataType::State, offset, format!("data state {}", err.number))
    })?;
    let code = StatusCode(reader.u8("state")?);
    let text_offset = reader.offset();
    let text = std::str::from_utf8(reader.length_prefixed("state text")?)
        .map_err(|_| CodecError::invalid_content(DataType::State, text_offset, "text is not UTF-8"))?
        .to_string();
    Ok(State {
        stream_state,
        data_state,
        code,
        text,
    })
}

fn utf8(content: &[u8], data_type: DataType, offset: usize) -> CodecResult<String> {
    String::from_utf8(content.to_vec())
        .map_err(|_| CodecError::invalid_content(data_type, offset, "invalid UTF-8"))
}

/// Read the content of a primitive of `data_type`
pub fn decode_primitive(data_type: DataType, reader: &mut WireReader<'_>) -> CodecResult<Data> {
    if reader.is_empty() {
        return Ok(Data::Blank(data_type));
    }
    let offset = reader.offset();
    let data = match data_type {
        DataType::Int => Data::Int(read_int(reader.rest_bytes(), offset)?),
        DataType::UInt => Data::UInt(read_uint(reader.rest_bytes(), offset)?),
        DataType::Float => {
            let bits = reader.u32("float")?;
            Data::Float(f32::from_bits(bits))
        }
        DataType::Double => {
            let high = reader.u32("double")? as u64;
            let low = reader.u32("double")? as u64;
            Data::Double(f64::from_bits((high << 32) | low))
        }
        DataType::Real => {
            let hint_byte = reader.u8("real hint")? & REAL_HINT_MASK;
            let hint = RealHint::try_from(hint_byte).map_err(|_| CodecError::InvalidRealHint {
                hint: hint_byte,
                offset,
            })?;
            if hint.is_special() {
                Data::Real(Real::new(0, hint))
            } else {
                let mantissa_offset = reader.offset();
                Data::Real(Real::new(read_int(reader.rest_bytes(), mantissa_offset)?, hint))
            }
        }
        DataType::Date => Data::Date(read_date(reader, data_type)?),
        DataType::Time => Data::Time(read_time(reader, data_type)?),
        DataType::DateTime => {
            let date = read_date(reader, data_type)?;
            let time = read_time(reader, data_type)?;
            Data::DateTime(DateTime::new(date, time))
        }
        DataType::Qos => Data::Qos(read_qos(reader)?),
        DataType::State => Data::State(read_state(reader)?),
        DataType::Enum => Data::Enum(reader.u16("enum")?),
        DataType::Buffer => Data::Buffer(Bytes::copy_from_slice(reader.rest_bytes())),
        DataType::AsciiString => Data::Ascii(utf8(reader.rest_bytes(), data_type, offset)?),
        DataType::Utf8String => Data::Utf8(utf8(reader.rest_bytes(), data_type, offset)?),
        DataType::RmtesString => Data::Rmtes(RmtesBuffer::new(reader.rest_bytes())),
        other => {
            return Err(CodecError::invalid_content(other, offset, "not a primitive type"));
        }
    };
    reader.expect_end("primitive")?;
    Ok(data)
}
