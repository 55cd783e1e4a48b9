//! Length-prefixed framing
//!
//! ## Wire Layout
//!
//! ```text
//! ┌──────────────┬─────────────────────┬────────────────────┐
//! │ length (u32) │ payload (length)    │ crc32 (u32, opt.)  │
//! │ big endian   │ one encoded message │ negotiated per chan│
//! └──────────────┴─────────────────────┴────────────────────┘
//! ```
//!
//! A zero length frame is a ping and never carries a checksum. The checksum
//! trailer covers the payload only and is present on every non-ping frame once
//! the handshake enabled it.

use crate::{Result, TransportError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Length prefix size
pub const HEADER_SIZE: usize = 4;
/// CRC32 trailer size
pub const CHECKSUM_SIZE: usize = 4;
/// Default upper bound on a single frame payload
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One unit read from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Heartbeat carrying no data
    Ping,
    /// One encoded message
    Message(Bytes),
}

/// Frame encoder/decoder for one direction of a channel
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    checksum: bool,
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            checksum: false,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl FrameCodec {
    pub fn new(checksum: bool, max_frame_size: usize) -> Self {
        Self {
            checksum,
            max_frame_size,
        }
    }

    pub fn checksum(&self) -> bool {
        self.checksum
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Bytes a payload of `len` occupies on the wire
    pub fn framed_len(&self, len: usize) -> usize {
        HEADER_SIZE + len + if self.checksum && len > 0 { CHECKSUM_SIZE } else { 0 }
    }

    /// Append a framed payload to `out`
    pub fn encode(&self, payload: &[u8], out: &mut BytesMut) -> Result<()> {
        if payload.is_empty() {
            return Err(TransportError::protocol(
                "empty payload cannot be framed: zero length is reserved for pings",
            ));
        }
        if payload.len() > self.max_frame_size {
            return Err(TransportError::protocol(format!(
                "Message size {} exceeds maximum {}",
                payload.len(),
                self.max_frame_size
            )));
        }
        out.reserve(self.framed_len(payload.len()));
        out.put_u32(payload.len() as u32);
        out.put_slice(payload);
        if self.checksum {
            out.put_u32(crc32fast::hash(payload));
        }
        Ok(())
    }

    /// Append a ping frame to `out`
    pub fn encode_ping(&self, out: &mut BytesMut) {
        out.put_u32(0);
    }

    /// Split one complete frame off the front of `buffer`
    ///
    /// Returns `Ok(None)` while the buffer holds only part of a frame.
    pub fn try_decode(&self, buffer: &mut BytesMut) -> Result<Option<Frame>> {
        if buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if len == 0 {
            buffer.advance(HEADER_SIZE);
            return Ok(Some(Frame::Ping));
        }
        if len > self.max_frame_size {
            return Err(TransportError::protocol(format!(
                "Message size {} exceeds maximum {}",
                len, self.max_frame_size
            )));
        }
        let total = self.framed_len(len);
        if buffer.len() < total {
            buffer.reserve(total - buffer.len());
            return Ok(None);
        }
        buffer.advance(HEADER_SIZE);
        let payload = buffer.split_to(len).freeze();
        if self.checksum {
            let expected = buffer.get_u32();
            let actual = crc32fast::hash(&payload);
            if expected != actual {
                return Err(TransportError::protocol(format!(
                    "checksum mismatch: frame carries {expected:#010x}, payload hashes to {actual:#010x}"
                )));
            }
        }
        Ok(Some(Frame::Message(payload)))
    }
}

/// Read half of a framed channel
pub struct FrameReader<R> {
    inner: R,
    codec: FrameCodec,
    buffer: BytesMut,
    bytes_received: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            buffer: BytesMut::with_capacity(64 * 1024),
            bytes_received: 0,
        }
    }

    /// Next frame, or `None` once the peer closed the stream cleanly
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.codec.try_decode(&mut self.buffer)? {
                trace!(frame = ?frame_kind(&frame), "Decoded frame");
                return Ok(Some(frame));
            }
            let read = self
                .inner
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| TransportError::network_with_source("Failed to read frame", e))?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::channel_closed(format!(
                    "peer closed mid-frame with {} bytes buffered",
                    self.buffer.len()
                )));
            }
            self.bytes_received += read as u64;
        }
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

fn frame_kind(frame: &Frame) -> &'static str {
    match frame {
        Frame::Ping => "ping",
        Frame::Message(_) => "message",
    }
}

/// Write half of a framed channel
///
/// Frames accumulate in an internal buffer until [`FrameWriter::flush`]; the
/// caller decides when a batch is large enough to push to the socket.
pub struct FrameWriter<W> {
    inner: W,
    codec: FrameCodec,
    pending: BytesMut,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, codec: FrameCodec) -> Self {
        Self {
            inner,
            codec,
            pending: BytesMut::with_capacity(64 * 1024),
            bytes_sent: 0,
        }
    }

    /// Queue one message frame
    pub fn push(&mut self, payload: &[u8]) -> Result<()> {
        self.codec.encode(payload, &mut self.pending)
    }

    /// Queue one ping frame
    pub fn push_ping(&mut self) {
        self.codec.encode_ping(&mut self.pending);
    }

    /// Bytes queued and not yet flushed
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Write everything queued to the stream
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let len = self.pending.len();
        self.inner
            .write_all(&self.pending)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to write frames", e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to flush stream", e))?;
        self.pending.clear();
        self.bytes_sent += len as u64;
        debug!(bytes = len, total_sent = self.bytes_sent, "Flushed frames");
        Ok(())
    }

    /// Write one message frame immediately
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.push(payload)?;
        self.flush().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.flush().await?;
        self.inner
            .shutdown()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to shut down stream", e))
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_a_zero_length_frame() {
        let codec = FrameCodec::default();
        let mut buffer = BytesMut::new();
        codec.encode_ping(&mut buffer);
        assert_eq!(&buffer[..], &[0, 0, 0, 0]);
        assert_eq!(codec.try_decode(&mut buffer).unwrap(), Some(Frame::Ping));
        assert!(buffer.is_empty());
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let codec = FrameCodec::default();
        let mut encoded = BytesMut::new();
        codec.encode(b"hello", &mut encoded).unwrap();

        let mut buffer = BytesMut::from(&encoded[..6]);
        assert_eq!(codec.try_decode(&mut buffer).unwrap(), None);
        buffer.extend_from_slice(&encoded[6..]);
        assert_eq!(
            codec.try_decode(&mut buffer).unwrap(),
            Some(Frame::Message(Bytes::from_static(b"hello")))
        );
    }

    #[test]
    fn checksum_detects_corruption() {
        let codec = FrameCodec::new(true, DEFAULT_MAX_FRAME_SIZE);
        let mut buffer = BytesMut::new();
        codec.encode(b"payload", &mut buffer).unwrap();
        assert_eq!(buffer.len(), codec.framed_len(7));
        buffer[5] ^= 0xFF;
        assert!(matches!(
            codec.try_decode(&mut buffer),
            Err(TransportError::Protocol { .. })
        ));
    }

    #[test]
    fn oversized_frames_are_rejected_both_ways() {
        let codec = FrameCodec::new(false, 8);
        let mut buffer = BytesMut::new();
        assert!(codec.encode(&[0u8; 9], &mut buffer).is_err());
        assert!(codec.encode(&[], &mut buffer).is_err());

        buffer.extend_from_slice(&100u32.to_be_bytes());
        assert!(codec.try_decode(&mut buffer).is_err());
    }

    #[tokio::test]
    async fn reader_and_writer_share_a_stream() {
        let (client, server) = tokio::io::duplex(64);
        let codec = FrameCodec::new(true, 1024);
        let mut writer = FrameWriter::new(client, codec);
        let mut reader = FrameReader::new(server, codec);

        writer.push(b"first").unwrap();
        writer.push_ping();
        writer.push(b"second").unwrap();
        assert_eq!(writer.pending_len(), codec.framed_len(5) + 4 + codec.framed_len(6));
        writer.flush().await.unwrap();

        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"first")))
        );
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Ping));
        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::Message(Bytes::from_static(b"second")))
        );

        writer.shutdown().await.unwrap();
        drop(writer);
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }
}
