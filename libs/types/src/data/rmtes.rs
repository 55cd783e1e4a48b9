//! RMTES text with partial-update support
//!
//! RMTES strings travel as raw bytes. An update may either replace the whole
//! value or carry escape sequences that patch the cached value in place:
//!
//! - `ESC [ n \``: move the cursor to byte offset `n`; subsequent bytes overwrite
//! - `ESC [ n b`: repeat the previously written byte `n` more times
//!
//! Character-set switching sequences are passed through untouched; conversion to
//! `String` is lossy for anything outside UTF-8.

use bytes::Bytes;
use std::fmt;

const ESC: u8 = 0x1b;
const CSI: u8 = b'[';
const CURSOR: u8 = b'`';
const REPEAT: u8 = b'b';

/// Raw RMTES value plus partial-update application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RmtesBuffer {
    raw: Vec<u8>,
}

/// One parsed partial-update control sequence
enum Control {
    Cursor(usize),
    Repeat(usize),
}

impl RmtesBuffer {
    pub fn new(raw: impl Into<Vec<u8>>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.raw)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether `update` contains a partial-update cursor sequence
    pub fn is_partial_update(update: &[u8]) -> bool {
        let mut i = 0;
        while i < update.len() {
            if let Some((Control::Cursor(_), _)) = parse_control(update, i) {
                return true;
            }
            i += 1;
        }
        false
    }

    /// Apply an inbound value: partial updates patch the cache, anything else replaces it
    pub fn apply(&mut self, update: &[u8]) {
        if !Self::is_partial_update(update) {
            self.raw = update.to_vec();
            return;
        }

        let mut cursor = 0usize;
        let mut last: Option<u8> = None;
        let mut i = 0usize;
        while i < update.len() {
            match parse_control(update, i) {
                Some((Control::Cursor(position), next)) => {
                    cursor = position;
                    last = None;
                    i = next;
                }
                Some((Control::Repeat(count), next)) => {
                    if let Some(byte) = last {
                        for _ in 0..count {
                            self.write_at(cursor, byte);
                            cursor += 1;
                        }
                    }
                    i = next;
                }
                None => {
                    self.write_at(cursor, update[i]);
                    last = Some(update[i]);
                    cursor += 1;
                    i += 1;
                }
            }
        }
    }

    fn write_at(&mut self, position: usize, byte: u8) {
        if position < self.raw.len() {
            self.raw[position] = byte;
        } else {
            // Gaps left by a cursor jump past the end are padded with spaces
            self.raw.resize(position, b' ');
            self.raw.push(byte);
        }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Parse `ESC [ digits (\` | b)` at `start`, returning the control and the index after it
fn parse_control(bytes: &[u8], start: usize) -> Option<(Control, usize)> {
    if bytes.get(start) != Some(&ESC) || bytes.get(start + 1) != Some(&CSI) {
        return None;
    }
    let mut i = start + 2;
    let mut value = 0usize;
    let mut digits = 0;
    while let Some(byte) = bytes.get(i).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add((byte - b'0') as usize);
        digits += 1;
        i += 1;
    }
    if digits == 0 {
        return None;
    }
    match bytes.get(i) {
        Some(&CURSOR) => Some((Control::Cursor(value), i + 1)),
        Some(&REPEAT) => Some((Control::Repeat(value), i + 1)),
        _ => None,
    }
}

impl From<&str> for RmtesBuffer {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl fmt::Display for RmtesBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}
