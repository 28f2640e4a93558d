use rpcmux_event::EventError;
use rpcmux_transport::TransportError;
use rpcmux_wire::WireError;

/// Errors that can occur in socket operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Malformed message envelope (missing or non-empty delimiter frame).
    /// Recovered locally: the message is dropped, the socket stays usable.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The codec failed on an otherwise well-framed message.
    /// Recovered locally: the message is dropped, the socket stays usable.
    #[error("event decode failed: {0}")]
    Deserialization(#[from] EventError),

    /// Underlying connection failure. Fatal for bind/connect calls,
    /// recoverable for sends.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Wire-level framing failure on the stream.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// An outbound message named a peer identity with no live connection.
    #[error("no connected peer with identity {0:?}")]
    UnknownPeer(String),

    /// A channel with this id is already open on the socket.
    #[error("channel id {0:?} is already open")]
    DuplicateChannel(String),

    /// The socket has been closed.
    #[error("socket closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SocketError>;
