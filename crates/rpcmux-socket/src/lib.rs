//! Multiplexing socket core for rpcmux.
//!
//! Many logical conversations ("channels") share one message-oriented
//! connection. A [`MultiplexingSocket`] routes each inbound event to the
//! open channel named by its `response_to` header, or surfaces it as a
//! new inbound request; a heartbeat supervisor sweeps the channel table
//! on a fixed cadence to keep live conversations alive and leave
//! non-responsive ones alone.
//!
//! Construction goes through a [`Context`], which owns the socket
//! identity counter and the server/client role factories.

pub mod channel;
pub mod client;
pub mod context;
pub mod error;
pub mod heartbeat;
pub mod mux;
pub mod notify;
pub mod server;
pub mod socket;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

pub use channel::{Channel, MuxChannel, HEARTBEAT_EVENT};
pub use client::ClientTransport;
pub use context::{
    Context, SocketConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DEBUG_INTERVAL,
    DEFAULT_HEARTBEAT_INTERVAL,
};
pub use error::{Result, SocketError};
pub use mux::MultiplexingSocket;
pub use notify::Notification;
pub use server::ServerTransport;
pub use transport::MessageTransport;

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
