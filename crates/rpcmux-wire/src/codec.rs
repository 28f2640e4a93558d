use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Frame header: magic (2) + length (4) + flags (1) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Magic bytes: "RM" (0x52 0x4D).
pub const MAGIC: [u8; 2] = [0x52, 0x4D];

/// Flag bit: another frame follows in the same message.
pub const FLAG_MORE: u8 = 0b0000_0001;

/// Default maximum frame payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum number of frames in one message.
pub const DEFAULT_MAX_FRAMES: usize = 64;

/// A single decoded wire frame.
#[derive(Debug, Clone)]
pub struct WireFrame {
    /// The frame payload. May be empty (the envelope delimiter is an
    /// empty frame).
    pub payload: Bytes,
    /// Whether another frame follows in the same message.
    pub more: bool,
}

/// Encode one frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Flags     │ Payload          │
/// │ 0x52 0x4D    │ (4B LE)   │ (1B)      │ (Length bytes)   │
/// │ "RM"         │           │ bit0=MORE │                  │
/// └──────────────┴───────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], more: bool, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_u8(if more { FLAG_MORE } else { 0 });
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<WireFrame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    if src[0..2] != MAGIC {
        return Err(WireError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes(src[2..6].try_into().unwrap()) as usize;
    // Unknown flag bits are ignored for forward compatibility.
    let more = src[6] & FLAG_MORE != 0;

    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(WireFrame { payload, more }))
}

/// Configuration for the wire codec.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum frame payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum number of frames per message. Default: 64.
    pub max_frames_per_message: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_frames_per_message: DEFAULT_MAX_FRAMES,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
