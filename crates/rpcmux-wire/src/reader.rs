use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use rpcmux_transport::MuxStream;

use crate::codec::{decode_frame, WireConfig};
use crate::error::{Result, WireError};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete multipart messages from any `Read` stream.
///
/// Frames are accumulated until one without the MORE flag arrives;
/// callers always get whole messages. Partial reads are handled
/// internally.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    /// Frames of the in-progress message.
    pending: Vec<Bytes>,
    config: WireConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: WireConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending: Vec::new(),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached,
    /// including EOF in the middle of a multi-frame message.
    pub fn read_message(&mut self) -> Result<Vec<Bytes>> {
        loop {
            while let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                if self.pending.len() >= self.config.max_frames_per_message {
                    let count = self.pending.len() + 1;
                    self.pending.clear();
                    return Err(WireError::TooManyFrames {
                        count,
                        max: self.config.max_frames_per_message,
                    });
                }
                self.pending.push(frame.payload);
                if !frame.more {
                    return Ok(std::mem::take(&mut self.pending));
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }
}

impl MessageReader<MuxStream> {
    /// Create a message reader for a `MuxStream`, applying the read
    /// timeout from the configuration.
    pub fn with_config_stream(inner: MuxStream, config: WireConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_wire_error(err: rpcmux_transport::TransportError) -> WireError {
    match err {
        rpcmux_transport::TransportError::Io(io)
        | rpcmux_transport::TransportError::Accept(io) => WireError::Io(io),
        rpcmux_transport::TransportError::Bind { source, .. }
        | rpcmux_transport::TransportError::Connect { source, .. } => WireError::Io(source),
        other => WireError::Io(std::io::Error::other(other.to_string())),
    }
}
