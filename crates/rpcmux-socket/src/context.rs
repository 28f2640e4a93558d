use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ClientTransport;
use crate::error::Result;
use crate::mux::MultiplexingSocket;
use crate::server::ServerTransport;
use crate::transport::MessageTransport;

/// Fixed default per-channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Default cadence of the heartbeat sweep.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Default cadence of the throttled table-size diagnostic.
pub const DEFAULT_DEBUG_INTERVAL: Duration = Duration::from_secs(60);

/// Tunables for a multiplexing socket.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Maximum concurrent in-flight events per channel, fixed at channel
    /// creation.
    pub channel_capacity: usize,
    /// Cadence of the liveness sweep. Channels count as non-responsive
    /// after two silent intervals.
    pub heartbeat_interval: Duration,
    /// Cadence of the table-size diagnostic. Observability only; never
    /// affects routing, liveness, or heartbeat decisions.
    pub debug_interval: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            debug_interval: DEFAULT_DEBUG_INTERVAL,
        }
    }
}

/// Owns the socket-identity counter and the role factories.
///
/// Socket identities are monotonic, assigned once per socket, and never
/// reused; they exist for diagnostics, not protocol correctness. Create
/// one context per process (or per test) and open sockets through it.
pub struct Context {
    socket_ids: AtomicU64,
}

impl Context {
    pub fn new() -> Self {
        Self {
            socket_ids: AtomicU64::new(0),
        }
    }

    /// Bind a server-role socket: accepts multiple peers and routes
    /// replies by envelope identity.
    pub fn server(&self, path: impl AsRef<Path>) -> Result<MultiplexingSocket> {
        self.server_with_config(path, SocketConfig::default())
    }

    /// Bind a server-role socket with explicit configuration.
    pub fn server_with_config(
        &self,
        path: impl AsRef<Path>,
        config: SocketConfig,
    ) -> Result<MultiplexingSocket> {
        let transport = ServerTransport::bind(path)?;
        MultiplexingSocket::start(
            self.next_id(),
            Arc::new(transport) as Arc<dyn MessageTransport>,
            config,
        )
    }

    /// Connect a client-role socket to a single listening peer.
    pub fn client(&self, path: impl AsRef<Path>) -> Result<MultiplexingSocket> {
        self.client_with_config(path, SocketConfig::default())
    }

    /// Connect a client-role socket with explicit configuration.
    pub fn client_with_config(
        &self,
        path: impl AsRef<Path>,
        config: SocketConfig,
    ) -> Result<MultiplexingSocket> {
        let transport = ClientTransport::connect(path)?;
        MultiplexingSocket::start(
            self.next_id(),
            Arc::new(transport) as Arc<dyn MessageTransport>,
            config,
        )
    }

    fn next_id(&self) -> u64 {
        self.socket_ids.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
