use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rpcmux_event::Event;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Result, SocketError};
use crate::lock;
use crate::socket::Socket;

/// Name of the internal keep-alive event exchanged on open channels.
pub const HEARTBEAT_EVENT: &str = "_mux_hb";

/// The channel table: id → live channel. The single source of truth for
/// routing decisions on a socket.
pub(crate) type ChannelTable = Arc<Mutex<HashMap<String, Arc<dyn Channel>>>>;

/// The capability a multiplexing socket consumes from a channel.
pub trait Channel: Send + Sync {
    /// The channel id, unique within the owning socket's table.
    fn id(&self) -> &str;

    /// Deliver an inbound event exclusively to this channel.
    fn invoke(&self, event: Event);

    /// Whether the peer has stopped responding as of `now`.
    fn is_non_responsive(&self, now: Instant) -> bool;

    /// Emit a keep-alive event on the channel.
    fn send_heartbeat(&self);

    /// Close the channel and remove it from the owning table. Idempotent.
    fn close(&self);

    /// When the channel was opened.
    fn opened_at(&self) -> Instant;
}

/// How a channel came to exist.
enum ChannelKind {
    /// Opened by local application code to start a conversation.
    Local,
    /// Opened in reaction to an unmatched inbound event.
    Remote { originating: Event },
}

/// A logical conversation multiplexed over one socket.
///
/// Locally-initiated channels get a fresh uuid id; peer-initiated
/// channels reuse the originating event's correlation id and keep its
/// routing envelope so replies reach the right peer. Inbound delivery is
/// a bounded queue of `capacity` events; liveness is a deadline refreshed
/// by every invoked event, heartbeats included.
pub struct MuxChannel {
    id: String,
    kind: ChannelKind,
    capacity: usize,
    opened_at: Instant,
    liveness_window: Duration,
    deadline: Mutex<Instant>,
    envelope: Vec<Bytes>,
    socket: Socket,
    table: Weak<Mutex<HashMap<String, Arc<dyn Channel>>>>,
    queue_tx: mpsc::SyncSender<Event>,
    queue_rx: Mutex<mpsc::Receiver<Event>>,
    closed: AtomicBool,
}

impl MuxChannel {
    /// Open a locally-initiated channel.
    pub(crate) fn local(
        socket: Socket,
        table: Weak<Mutex<HashMap<String, Arc<dyn Channel>>>>,
        capacity: usize,
        liveness_window: Duration,
    ) -> Arc<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        Self::build(id, ChannelKind::Local, Vec::new(), socket, table, capacity, liveness_window)
    }

    /// Open a peer-initiated channel bound to the event that caused it.
    pub(crate) fn remote(
        originating: Event,
        socket: Socket,
        table: Weak<Mutex<HashMap<String, Arc<dyn Channel>>>>,
        capacity: usize,
        liveness_window: Duration,
    ) -> Arc<Self> {
        let id = originating
            .correlation_id()
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let envelope = originating.envelope().to_vec();
        Self::build(
            id,
            ChannelKind::Remote { originating },
            envelope,
            socket,
            table,
            capacity,
            liveness_window,
        )
    }

    fn build(
        id: String,
        kind: ChannelKind,
        envelope: Vec<Bytes>,
        socket: Socket,
        table: Weak<Mutex<HashMap<String, Arc<dyn Channel>>>>,
        capacity: usize,
        liveness_window: Duration,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::sync_channel(capacity);
        let opened_at = Instant::now();
        Arc::new(Self {
            id,
            kind,
            capacity,
            opened_at,
            liveness_window,
            deadline: Mutex::new(opened_at + liveness_window),
            envelope,
            socket,
            table,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            closed: AtomicBool::new(false),
        })
    }

    /// Send an event on this channel. The event is correlated to the
    /// channel id and routed back over the originating envelope.
    pub fn send(&self, name: impl Into<String>, args: Vec<Value>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        let event = Event::correlated(name, args, &self.id, self.envelope.clone());
        self.socket.send(&event)
    }

    /// Receive the next event delivered to this channel, waiting up to
    /// `timeout`. Returns `None` on timeout or after close.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        lock(&self.queue_rx).recv_timeout(timeout).ok()
    }

    /// Receive the next event if one is already queued.
    pub fn try_recv(&self) -> Option<Event> {
        lock(&self.queue_rx).try_recv().ok()
    }

    /// The event that caused this channel to be opened, for
    /// peer-initiated channels.
    pub fn originating_event(&self) -> Option<&Event> {
        match &self.kind {
            ChannelKind::Local => None,
            ChannelKind::Remote { originating } => Some(originating),
        }
    }

    /// Maximum number of in-flight inbound events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Channel for MuxChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(&self, event: Event) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(channel = %self.id, "dropping event for closed channel");
            return;
        }

        // Any inbound traffic proves the peer is alive.
        *lock(&self.deadline) = Instant::now() + self.liveness_window;

        if event.name() == HEARTBEAT_EVENT {
            trace!(channel = %self.id, "heartbeat received");
            return;
        }

        match self.queue_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(_)) => {
                warn!(
                    channel = %self.id,
                    capacity = self.capacity,
                    "channel at capacity, dropping event"
                );
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                debug!(channel = %self.id, "delivery queue gone, dropping event");
            }
        }
    }

    fn is_non_responsive(&self, now: Instant) -> bool {
        now > *lock(&self.deadline)
    }

    fn send_heartbeat(&self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let event = Event::correlated(HEARTBEAT_EVENT, Vec::new(), &self.id, self.envelope.clone());
        if let Err(err) = self.socket.send(&event) {
            warn!(channel = %self.id, error = %err, "heartbeat send failed");
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(table) = self.table.upgrade() {
            lock(&table).remove(&self.id);
        }
        debug!(channel = %self.id, "channel closed");
    }

    fn opened_at(&self) -> Instant {
        self.opened_at
    }
}
