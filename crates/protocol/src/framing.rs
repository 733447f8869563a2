//! Frame codecs for the native-API wire format.
//!
//! # Plaintext framing
//!
//! Each application message on an unencrypted connection is framed as:
//!
//! - 1 byte: preamble `0x00`
//! - varint: payload length in bytes
//! - varint: message type identifier
//! - N bytes: payload
//!
//! # Encrypted-session framing
//!
//! Frames exchanged on an encrypted connection (handshake material and,
//! after the split, AEAD records) use a smaller envelope:
//!
//! - 1 byte: indicator `0x01`
//! - 2 bytes: payload length (big-endian)
//! - N bytes: payload
//!
//! The plaintext recovered from an AEAD record carries the plaintext framing
//! above, so the layer consuming decrypted bytes is identical to the
//! unencrypted case.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::varint;

/// Preamble byte opening every plaintext frame.
pub const FRAME_PREAMBLE: u8 = 0x00;

/// Indicator byte opening every encrypted-session frame.
pub const NOISE_INDICATOR: u8 = 0x01;

/// Hard cap on a single message payload (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum payload of an encrypted-session frame, bounded by its u16 length.
pub const MAX_NOISE_FRAME_SIZE: usize = u16::MAX as usize;

/// Header size of an encrypted-session frame: indicator + u16 length.
pub const NOISE_HEADER_SIZE: usize = 3;

/// One complete application message as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message type identifier.
    pub msg_type: u32,
    /// Protobuf-encoded payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame from a type identifier and payload bytes.
    pub fn new(msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            payload: payload.into(),
        }
    }
}

/// Encoder and streaming decoder for plaintext frames.
///
/// Encoding is pure and stateless; decoding accumulates arbitrary byte
/// chunks and emits every complete frame as soon as it is available.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
    resync_skips: u64,
}

impl FrameCodec {
    /// Create a new codec with an empty accumulation buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one frame: `0x00 || varint(len) || varint(type) || payload`.
    pub fn encode(msg_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 11);
        out.push(FRAME_PREAMBLE);
        varint::encode(payload.len() as u64, &mut out);
        varint::encode(u64::from(msg_type), &mut out);
        out.extend_from_slice(payload);
        out
    }

    /// Feed a chunk of bytes and return every frame completed by it,
    /// in wire order.
    ///
    /// Incomplete trailing data is retained for the next call. A declared
    /// length above [`MAX_FRAME_SIZE`] or a malformed varint is fatal.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract(&mut self) -> Result<Option<Frame>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        // Resynchronize on the next preamble if the head byte is wrong.
        // This should not occur in a well-formed stream.
        if self.buffer[0] != FRAME_PREAMBLE {
            match self.buffer.iter().position(|&b| b == FRAME_PREAMBLE) {
                Some(pos) => {
                    tracing::warn!(skipped = pos, "skipping garbage before frame preamble");
                    self.resync_skips += pos as u64;
                    self.buffer.advance(pos);
                }
                None => {
                    let len = self.buffer.len();
                    tracing::warn!(skipped = len, "no frame preamble in buffer, dropping");
                    self.resync_skips += len as u64;
                    self.buffer.clear();
                    return Ok(None);
                }
            }
        }

        if self.buffer.len() < 2 {
            return Ok(None);
        }

        let Some((len, len_size)) = varint::decode(&self.buffer[1..])? else {
            return Ok(None);
        };
        let len = len as usize;
        if len > MAX_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        let type_offset = 1 + len_size;
        let Some((msg_type, type_size)) = varint::decode(&self.buffer[type_offset..])? else {
            return Ok(None);
        };
        let msg_type = u32::try_from(msg_type).map_err(|_| ProtocolError::InvalidVarint)?;

        let data_offset = type_offset + type_size;
        if self.buffer.len() < data_offset + len {
            return Ok(None);
        }

        self.buffer.advance(data_offset);
        let payload = self.buffer.split_to(len).freeze();
        Ok(Some(Frame { msg_type, payload }))
    }

    /// Discard any partial frame. Called on disconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Total bytes discarded while resynchronizing on a preamble.
    pub fn resync_skips(&self) -> u64 {
        self.resync_skips
    }

    /// Whether the accumulation buffer holds no pending bytes.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Encoder and streaming decoder for encrypted-session frames.
#[derive(Debug, Default)]
pub struct NoiseFrameCodec {
    buffer: BytesMut,
}

impl NoiseFrameCodec {
    /// Create a new codec with an empty accumulation buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one envelope frame: `0x01 || u16-be(len) || payload`.
    pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_NOISE_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_NOISE_FRAME_SIZE,
            });
        }
        let mut out = Vec::with_capacity(NOISE_HEADER_SIZE + payload.len());
        out.push(NOISE_INDICATOR);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    }

    /// Append a chunk of bytes without extracting anything.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Extract the next complete envelope payload, if one is buffered.
    pub fn next(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < NOISE_HEADER_SIZE {
            return Ok(None);
        }
        if self.buffer[0] != NOISE_INDICATOR {
            return Err(ProtocolError::BadIndicator {
                got: self.buffer[0],
            });
        }
        let len = u16::from_be_bytes([self.buffer[1], self.buffer[2]]) as usize;
        if self.buffer.len() < NOISE_HEADER_SIZE + len {
            return Ok(None);
        }
        self.buffer.advance(NOISE_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Feed a chunk and return every envelope payload completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.push(chunk);
        let mut payloads = Vec::new();
        while let Some(payload) = self.next()? {
            payloads.push(payload);
        }
        Ok(payloads)
    }

    /// Discard any partial frame. Called on disconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
