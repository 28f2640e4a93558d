use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use rpcmux_transport::{MuxStream, UnixEndpoint};
use rpcmux_wire::{MessageReader, MessageWriter, WireError};
use tracing::{debug, warn};

use crate::error::{Result, SocketError};
use crate::lock;
use crate::transport::{IncomingQueue, MessageTransport};

type PeerRegistry = Arc<Mutex<HashMap<String, Arc<PeerEntry>>>>;

struct PeerEntry {
    writer: Mutex<MessageWriter<MuxStream>>,
    control: MuxStream,
}

/// Server transport role: accepts multiple peers and routes outbound
/// messages by envelope identity.
///
/// Every accepted connection is assigned a monotonic identity
/// (`peer-N`). Inbound messages get the identity prepended as the first
/// envelope frame; outbound messages pop the first frame and are routed
/// to the connection it names. Disconnected peers are pruned from the
/// registry.
pub struct ServerTransport {
    endpoint: PathBuf,
    peers: PeerRegistry,
    incoming: Mutex<Option<IncomingQueue>>,
    accept: Mutex<Option<JoinHandle<()>>>,
    linger: Mutex<Option<Duration>>,
    closed: Arc<AtomicBool>,
}

impl ServerTransport {
    /// Bind a listening endpoint. Failure is fatal to this call.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let endpoint_path = path.as_ref().to_path_buf();
        let endpoint = UnixEndpoint::bind(&endpoint_path)?;

        let peers: PeerRegistry = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let accept = {
            let peers = Arc::clone(&peers);
            let closed = Arc::clone(&closed);
            std::thread::Builder::new()
                .name("rpcmux-server-accept".to_string())
                .spawn(move || accept_loop(endpoint, peers, closed, tx))
                .map_err(rpcmux_transport::TransportError::Io)?
        };

        Ok(Self {
            endpoint: endpoint_path,
            peers,
            incoming: Mutex::new(Some(rx)),
            accept: Mutex::new(Some(accept)),
            linger: Mutex::new(None),
            closed,
        })
    }

    /// Number of currently connected peers.
    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }
}

fn accept_loop(
    endpoint: UnixEndpoint,
    peers: PeerRegistry,
    closed: Arc<AtomicBool>,
    tx: mpsc::Sender<std::result::Result<Vec<Bytes>, SocketError>>,
) {
    let mut next_peer = 1u64;
    loop {
        let stream = match endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => {
                if closed.load(Ordering::SeqCst) {
                    return;
                }
                let _ = tx.send(Err(err.into()));
                return;
            }
        };
        if closed.load(Ordering::SeqCst) {
            return;
        }

        let identity = format!("peer-{next_peer}");
        next_peer += 1;

        let (reader_stream, control) = match (stream.try_clone(), stream.try_clone()) {
            (Ok(reader), Ok(control)) => (reader, control),
            _ => {
                warn!(peer = %identity, "failed to clone accepted stream; dropping connection");
                continue;
            }
        };

        lock(&peers).insert(
            identity.clone(),
            Arc::new(PeerEntry {
                writer: Mutex::new(MessageWriter::new(stream)),
                control,
            }),
        );
        debug!(peer = %identity, "peer connected");

        let peers = Arc::clone(&peers);
        let tx = tx.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("rpcmux-server-reader-{identity}"))
            .spawn(move || peer_read_loop(identity, MessageReader::new(reader_stream), peers, tx));
        if let Err(err) = spawned {
            warn!(error = %err, "failed to spawn peer reader");
        }
    }
}

fn peer_read_loop(
    identity: String,
    mut reader: MessageReader<MuxStream>,
    peers: PeerRegistry,
    tx: mpsc::Sender<std::result::Result<Vec<Bytes>, SocketError>>,
) {
    loop {
        match reader.read_message() {
            Ok(mut frames) => {
                frames.insert(0, Bytes::from(identity.clone().into_bytes()));
                if tx.send(Ok(frames)).is_err() {
                    break;
                }
            }
            Err(WireError::ConnectionClosed) => {
                debug!(peer = %identity, "peer disconnected");
                break;
            }
            Err(err) => {
                let _ = tx.send(Err(err.into()));
                break;
            }
        }
    }
    lock(&peers).remove(&identity);
}

impl MessageTransport for ServerTransport {
    fn send(&self, mut frames: Vec<Bytes>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        if frames.is_empty() {
            return Err(WireError::EmptyMessage.into());
        }

        let identity_frame = frames.remove(0);
        let identity = String::from_utf8_lossy(&identity_frame).into_owned();
        let entry = lock(&self.peers)
            .get(&identity)
            .cloned()
            .ok_or(SocketError::UnknownPeer(identity))?;

        lock(&entry.writer).write_message(&frames)?;
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

        let linger = *lock(&self.linger);
        for (identity, entry) in lock(&self.peers).drain() {
            if let Some(duration) = linger {
                let _ = entry.control.set_linger(Some(duration));
            }
            let _ = entry.control.shutdown();
            debug!(peer = %identity, "peer connection shut down");
        }

        // Wake the accept loop with a throwaway connection so it can
        // observe the closed flag and exit.
        let _ = UnixEndpoint::connect(&self.endpoint);
        if let Some(accept) = lock(&self.accept).take() {
            let _ = accept.join();
        }
        debug!(endpoint = ?self.endpoint, "server transport closed");
    }

    fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}

impl Drop for ServerTransport {
    fn drop(&mut self) {
        self.close();
    }
}
