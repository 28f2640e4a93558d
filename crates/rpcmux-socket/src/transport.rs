use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::error::SocketError;

/// The incoming-message queue of a transport: complete multipart
/// messages, or transport-level receive errors, in arrival order.
pub type IncomingQueue = mpsc::Receiver<std::result::Result<Vec<Bytes>, SocketError>>;

/// The capability a multiplexing socket consumes from its transport.
///
/// A transport owns the underlying connection(s), turns the byte stream
/// into complete multipart messages on reader threads, and writes
/// outbound messages synchronously. The socket owns the transport
/// exclusively and closes it on teardown.
pub trait MessageTransport: Send + Sync {
    /// Send one multipart message. No buffering, no retry; a failure
    /// means the send did not happen (at-most-once).
    fn send(&self, frames: Vec<Bytes>) -> Result<()>;

    /// Take the incoming-message queue. Handed over exactly once;
    /// subsequent calls return `None`.
    fn take_incoming(&self) -> Option<IncomingQueue>;

    /// Configure the linger applied to live connections when the
    /// transport closes.
    fn set_linger(&self, linger: Option<Duration>);

    /// Close the transport. Idempotent; stops reader threads and
    /// disconnects the incoming queue.
    fn close(&self);

    /// The endpoint this transport is bound or connected to.
    fn endpoint(&self) -> &Path;
}
