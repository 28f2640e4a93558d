//! Multiplexed RPC transport over message-oriented sockets.
//!
//! rpcmux lets many independent logical conversations share one
//! underlying connection: events are correlated to open channels by
//! header, dead peers are detected by a periodic heartbeat sweep, and
//! per-conversation concurrency is bounded.
//!
//! # Crate Structure
//!
//! - [`transport`] — Unix domain socket streams (bind/accept/connect)
//! - [`wire`] — multipart message framing over byte streams
//! - [`event`] — the event data model and body codec
//! - [`socket`] — the multiplexing core: routing, channels, heartbeats

/// Re-export transport types.
pub mod transport {
    pub use rpcmux_transport::*;
}

/// Re-export wire framing types.
pub mod wire {
    pub use rpcmux_wire::*;
}

/// Re-export event types.
pub mod event {
    pub use rpcmux_event::*;
}

/// Re-export the multiplexing socket core.
pub mod socket {
    pub use rpcmux_socket::*;
}
