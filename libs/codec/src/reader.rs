//! Bounds-checked cursor over inbound bytes
//!
//! Every read is checked against the remaining buffer and reports the absolute
//! offset of the failure. Sub-readers created for length-prefixed content keep
//! the absolute offset of their parent so nested errors point into the frame.

use crate::constants::{LEN_U16_MARKER, LEN_U32_MARKER};
use crate::error::{CodecError, CodecResult};
use bytes::{BufMut, BytesMut};

#[derive(Debug, Clone, Copy)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, base: 0 }
    }

    /// Absolute offset of the next byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, len: usize, context: &'static str) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::truncated(len, self.remaining(), self.offset(), context));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, context: &'static str) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N, context)?);
        Ok(out)
    }

    pub fn u8(&mut self, context: &'static str) -> CodecResult<u8> {
        Ok(self.array::<1>(context)?[0])
    }

    pub fn u16(&mut self, context: &'static str) -> CodecResult<u16> {
        Ok(u16::from_be_bytes(self.array(context)?))
    }

    pub fn i16(&mut self, context: &'static str) -> CodecResult<i16> {
        Ok(i16::from_be_bytes(self.array(context)?))
    }

    pub fn u32(&mut self, context: &'static str) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.array(context)?))
    }

    pub fn i32(&mut self, context: &'static str) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.array(context)?))
    }

    /// Compact length prefix
    pub fn length(&mut self, context: &'static str) -> CodecResult<usize> {
        match self.u8(context)? {
            LEN_U16_MARKER => Ok(self.u16(context)? as usize),
            LEN_U32_MARKER => Ok(self.u32(context)? as usize),
            short => Ok(short as usize),
        }
    }

    /// Length-prefixed byte run
    pub fn length_prefixed(&mut self, context: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.length(context)?;
        self.bytes(len, context)
    }

    /// Reader over the next length-prefixed run
    pub fn sub_reader(&mut self, context: &'static str) -> CodecResult<WireReader<'a>> {
        let len = self.length(context)?;
        let base = self.offset();
        let buf = self.bytes(len, context)?;
        Ok(WireReader { buf, pos: 0, base })
    }

    /// Consume and return the rest of the buffer
    pub fn rest_bytes(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    /// Reader over the rest of the buffer
    pub fn rest(&mut self) -> WireReader<'a> {
        let base = self.offset();
        let buf = &self.buf[self.pos..];
        self.pos = self.buf.len();
        WireReader { buf, pos: 0, base }
    }

    pub fn expect_end(&self, context: &'static str) -> CodecResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.remaining(),
                context,
            })
        }
    }
}

/// Write a compact length prefix
pub fn put_length(out: &mut BytesMut, len: usize) -> CodecResult<()> {
    if len < LEN_U16_MARKER as usize {
        out.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        out.put_u8(LEN_U16_MARKER);
        out.put_u16(len as u16);
    } else if len <= u32::MAX as usize {
        out.put_u8(LEN_U32_MARKER);
        out.put_u32(len as u32);
    } else {
        return Err(CodecError::too_large("length", len, u32::MAX as usize));
    }
    Ok(())
}

pub fn put_length_prefixed(out: &mut BytesMut, bytes: &[u8]) -> CodecResult<()> {
    put_length(out, bytes.len())?;
    out.put_slice(bytes);
    Ok(())
}

/// Encode `content` into a scratch buffer, then write it length-prefixed
pub fn put_nested<F>(out: &mut BytesMut, content: F) -> CodecResult<()>
where
    F: FnOnce(&mut BytesMut) -> CodecResult<()>,
{
    let mut scratch = BytesMut::new();
    content(&mut scratch)?;
    put_length_prefixed(out, &scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_widths() {
        for (len, width) in [(0usize, 1usize), (253, 1), (254, 3), (65_535, 3), (65_536, 5)] {
            let mut out = BytesMut::new();
            put_length(&mut out, len).unwrap();
            assert_eq!(out.len(), width, "len {len}");
            assert_eq!(WireReader::new(&out).length("test").unwrap(), len);
        }
    }

    #[test]
    fn truncation_reports_absolute_offset() {
        let bytes = [3u8, 1, 2, 3, 0x10];
        let mut reader = WireReader::new(&bytes);
        let mut sub = reader.sub_reader("outer").unwrap();
        sub.bytes(3, "inner").unwrap();
        let err = sub.u8("inner").unwrap_err();
        assert_eq!(err, CodecError::truncated(1, 0, 4, "inner"));
        assert_eq!(reader.u8("tail").unwrap(), 0x10);
    }
}
