use std::sync::Arc;

use bytes::Bytes;
use rpcmux_event::Event;

use crate::error::{Result, SocketError};
use crate::transport::MessageTransport;

/// The framing and codec boundary of a socket.
///
/// Bridges raw multipart messages and structured events in both
/// directions. Cheap to clone; channels hold a clone as their send half.
#[derive(Clone)]
pub(crate) struct Socket {
    transport: Arc<dyn MessageTransport>,
}

impl Socket {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self { transport }
    }

    /// Encode an event and forward its frames to the transport
    /// unmodified. At-most-once: no buffering, no retry.
    pub fn send(&self, event: &Event) -> Result<()> {
        let frames = rpcmux_event::serialize(event)?;
        self.transport.send(frames)
    }

    /// Split one raw message into envelope and body and decode the event.
    ///
    /// The next-to-last frame must be the empty delimiter; anything else
    /// is a protocol violation. Failures here are recoverable — the
    /// caller drops the message and the socket stays usable.
    pub fn decode(frames: Vec<Bytes>) -> Result<Event> {
        if frames.len() < 2 {
            return Err(SocketError::Protocol(format!(
                "message with {} frame(s) has no delimiter",
                frames.len()
            )));
        }

        let delimiter = &frames[frames.len() - 2];
        if !delimiter.is_empty() {
            return Err(SocketError::Protocol(
                "expected next-to-last frame to be an empty delimiter".to_string(),
            ));
        }

        let body = frames[frames.len() - 1].clone();
        let envelope = frames[..frames.len() - 2].to_vec();
        Ok(rpcmux_event::deserialize(envelope, &body)?)
    }
}
