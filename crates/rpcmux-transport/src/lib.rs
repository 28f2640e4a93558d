//! Unix domain socket stream transport for rpcmux.
//!
//! This is the lowest layer of the stack: connected byte streams with
//! bind/accept/connect lifecycle, socket-file hygiene, and the socket
//! options the upper layers need (timeouts, linger, shutdown).

pub mod error;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::MuxStream;
pub use uds::UnixEndpoint;
