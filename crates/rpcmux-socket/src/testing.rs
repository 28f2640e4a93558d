//! In-memory transport double shared by the socket-core tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use rpcmux_event::Event;

use crate::error::{Result, SocketError};
use crate::lock;
use crate::socket::Socket;
use crate::transport::{IncomingQueue, MessageTransport};

/// A transport that records every sent message and lets tests inject
/// inbound messages directly into the incoming queue.
pub(crate) struct RecordingTransport {
    endpoint: PathBuf,
    pub sent: Mutex<Vec<Vec<Bytes>>>,
    pub fail_sends: AtomicBool,
    tx: Mutex<Option<mpsc::Sender<std::result::Result<Vec<Bytes>, SocketError>>>>,
    incoming: Mutex<Option<IncomingQueue>>,
    closed: AtomicBool,
    pub linger: Mutex<Option<Duration>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        Arc::new(Self {
            endpoint: PathBuf::from("/tmp/rpcmux-recording.sock"),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
            tx: Mutex::new(Some(tx)),
            incoming: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
            linger: Mutex::new(None),
        })
    }

    /// Inject one raw inbound message.
    pub fn inject(&self, frames: Vec<Bytes>) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(Ok(frames));
        }
    }

    /// Inject an inbound event in its wire form.
    pub fn inject_event(&self, event: &Event) {
        self.inject(rpcmux_event::serialize(event).expect("event should serialize"));
    }

    /// Inject a transport-level receive error.
    pub fn inject_error(&self, err: SocketError) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(Err(err));
        }
    }

    /// Every sent message decoded back into an event.
    pub fn sent_events(&self) -> Vec<Event> {
        lock(&self.sent)
            .iter()
            .map(|frames| Socket::decode(frames.clone()).expect("sent frames should decode"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// A channel double that counts the calls the core makes on it.
pub(crate) struct MockChannel {
    id: String,
    opened_at: std::time::Instant,
    pub non_responsive: AtomicBool,
    pub invokes: std::sync::atomic::AtomicUsize,
    pub heartbeats: std::sync::atomic::AtomicUsize,
    pub closes: std::sync::atomic::AtomicUsize,
    /// When set, the channel removes itself from this table on its next
    /// heartbeat (simulates self-eviction mid-sweep).
    pub remove_from_on_heartbeat: Mutex<Option<crate::channel::ChannelTable>>,
}

impl MockChannel {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            opened_at: std::time::Instant::now(),
            non_responsive: AtomicBool::new(false),
            invokes: std::sync::atomic::AtomicUsize::new(0),
            heartbeats: std::sync::atomic::AtomicUsize::new(0),
            closes: std::sync::atomic::AtomicUsize::new(0),
            remove_from_on_heartbeat: Mutex::new(None),
        })
    }
}

impl crate::channel::Channel for MockChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn invoke(&self, _event: Event) {
        self.invokes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_non_responsive(&self, _now: std::time::Instant) -> bool {
        self.non_responsive.load(Ordering::SeqCst)
    }

    fn send_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        if let Some(table) = lock(&self.remove_from_on_heartbeat).take() {
            lock(&table).remove(&self.id);
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn opened_at(&self) -> std::time::Instant {
        self.opened_at
    }
}

impl MessageTransport for RecordingTransport {
    fn send(&self, frames: Vec<Bytes>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::Transport(
                std::io::Error::from(std::io::ErrorKind::BrokenPipe).into(),
            ));
        }
        lock(&self.sent).push(frames);
        Ok(())
    }

    fn take_incoming(&self) -> Option<IncomingQueue> {
        lock(&self.incoming).take()
    }

    fn set_linger(&self, linger: Option<Duration>) {
        *lock(&self.linger) = linger;
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender disconnects the incoming queue.
        lock(&self.tx).take();
    }

    fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}
