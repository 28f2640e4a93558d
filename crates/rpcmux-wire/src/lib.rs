//! Multipart message framing for rpcmux.
//!
//! A wire message is an ordered run of frames; each frame carries:
//! - A 2-byte magic number ("RM") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 1-byte flag field whose MORE bit links frames into one message
//!
//! [`MessageReader`] and [`MessageWriter`] turn a byte stream into
//! complete multi-frame messages and back. No partial reads, no buffer
//! management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, WireConfig, WireFrame, DEFAULT_MAX_FRAMES, DEFAULT_MAX_PAYLOAD,
    FLAG_MORE, HEADER_SIZE,
};
pub use error::{Result, WireError};
pub use reader::MessageReader;
pub use writer::MessageWriter;
