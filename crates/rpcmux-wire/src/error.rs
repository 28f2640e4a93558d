/// Errors that can occur during wire encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x524D \"RM\")")]
    InvalidMagic,

    /// A frame payload exceeds the configured maximum size.
    #[error("frame payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A message carries more frames than the configured maximum.
    #[error("too many frames in message ({count}, max {max})")]
    TooManyFrames { count: usize, max: usize },

    /// A message must contain at least one frame.
    #[error("cannot write a message with zero frames")]
    EmptyMessage,

    /// An I/O error occurred while reading or writing frames.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete message was received.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
