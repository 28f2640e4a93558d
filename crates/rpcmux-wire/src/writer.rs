use std::io::{ErrorKind, Write};

use bytes::{Bytes, BytesMut};
use rpcmux_transport::MuxStream;

use crate::codec::{encode_frame, WireConfig};
use crate::error::{Result, WireError};
use crate::reader::transport_to_wire_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete multipart messages to any `Write` stream.
///
/// All frames of a message are encoded back-to-back with the MORE flag
/// set on every frame but the last, written out in full, and flushed
/// once per message.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: WireConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, WireConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: WireConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one complete message (blocking).
    pub fn write_message(&mut self, frames: &[Bytes]) -> Result<()> {
        if frames.is_empty() {
            return Err(WireError::EmptyMessage);
        }
        if frames.len() > self.config.max_frames_per_message {
            return Err(WireError::TooManyFrames {
                count: frames.len(),
                max: self.config.max_frames_per_message,
            });
        }

        self.buf.clear();
        for (i, frame) in frames.iter().enumerate() {
            if frame.len() > self.config.max_payload_size {
                return Err(WireError::PayloadTooLarge {
                    size: frame.len(),
                    max: self.config.max_payload_size,
                });
            }
            encode_frame(frame, i + 1 < frames.len(), &mut self.buf)?;
        }

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(WireError::Io(err)),
            }
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

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &WireConfig {
        &self.config
    }
}

impl MessageWriter<MuxStream> {
    /// Create a message writer for a `MuxStream`, applying the write
    /// timeout from the configuration.
    pub fn with_config_stream(inner: MuxStream, config: WireConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_wire_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::MessageReader;

    fn frames(parts: &[&'static [u8]]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::from_static(p)).collect()
    }

    #[test]
    fn write_single_frame_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_message(&frames(&[b"hello"])).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let message = reader.read_message().unwrap();
        assert_eq!(message.len(), 1);
        assert_eq!(message[0].as_ref(), b"hello");
    }

    #[test]
    fn write_multipart_message() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_message(&frames(&[b"identity", b"", b"body"]))
            .unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = MessageReader::new(Cursor::new(wire));
        let message = reader.read_message().unwrap();
        assert_eq!(message.len(), 3);
        assert!(message[1].is_empty());
        assert_eq!(message[2].as_ref(), b"body");
    }

    #[test]
    fn empty_message_rejected() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.write_message(&[]).unwrap_err();
        assert!(matches!(err, WireError::EmptyMessage));
    }

    #[test]
    fn oversized_frame_rejected() {
        let cfg = WireConfig {
            max_payload_size: 4,
            ..WireConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer.write_message(&frames(&[b"oversized"])).unwrap_err();
        assert!(matches!(err, WireError::PayloadTooLarge { .. }));
    }

    #[test]
    fn too_many_frames_rejected() {
        let cfg = WireConfig {
            max_frames_per_message: 2,
            ..WireConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);
        let err = writer
            .write_message(&frames(&[b"a", b"b", b"c"]))
            .unwrap_err();
        assert!(matches!(err, WireError::TooManyFrames { count: 3, max: 2 }));
    }

    #[test]
    fn interrupted_write_and_flush_retry() {
        let sink = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };
        let mut writer = MessageWriter::new(sink);
        writer.write_message(&frames(&[b"retry"])).unwrap();

        let inner = writer.into_inner();
        assert!(!inner.data.is_empty());
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.write_message(&frames(&[b"x"])).unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_writes_complete() {
        let sink = OneBytePerWrite { data: Vec::new() };
        let mut writer = MessageWriter::new(sink);
        writer.write_message(&frames(&[b"", b"chunked"])).unwrap();

        let wire = writer.into_inner().data;
        let mut reader = MessageReader::new(Cursor::new(wire));
        let message = reader.read_message().unwrap();
        assert_eq!(message[1].as_ref(), b"chunked");
    }

    struct OneBytePerWrite {
        data: Vec<u8>,
    }

    impl Write for OneBytePerWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            self.data.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
