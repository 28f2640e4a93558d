use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use rpcmux_transport::{MuxStream, UnixEndpoint};
use rpcmux_wire::{MessageReader, MessageWriter, WireError};
use tracing::debug;

use crate::error::{Result, SocketError};
use crate::lock;
use crate::transport::{IncomingQueue, MessageTransport};

/// Client transport role: one connection to a single listening peer.
///
/// A reader thread turns the byte stream into complete multipart
/// messages and queues them in arrival order; sends go through a
/// mutex-guarded writer on the caller's thread.
pub struct ClientTransport {
    endpoint: PathBuf,
    writer: Mutex<MessageWriter<MuxStream>>,
    control: MuxStream,
    incoming: Mutex<Option<IncomingQueue>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    linger: Mutex<Option<Duration>>,
    closed: AtomicBool,
}

impl ClientTransport {
    /// Connect to a listening endpoint. Failure is fatal to this call.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let endpoint = path.as_ref().to_path_buf();
        let stream = UnixEndpoint::connect(&endpoint)?;
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let (tx, rx) = mpsc::channel();
        let reader = std::thread::Builder::new()
            .name("rpcmux-client-reader".to_string())
            .spawn(move || read_loop(MessageReader::new(reader_stream), tx))
            .map_err(rpcmux_transport::TransportError::Io)?;

        Ok(Self {
            endpoint,
            writer: Mutex::new(MessageWriter::new(stream)),
            control,
            incoming: Mutex::new(Some(rx)),
            reader: Mutex::new(Some(reader)),
            linger: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

fn read_loop(
    mut reader: MessageReader<MuxStream>,
    tx: mpsc::Sender<std::result::Result<Vec<Bytes>, SocketError>>,
) {
    loop {
        match reader.read_message() {
            Ok(frames) => {
                if tx.send(Ok(frames)).is_err() {
                    return;
                }
            }
            Err(WireError::ConnectionClosed) => {
                debug!("connection closed");
                return;
            }
            Err(err) => {
                // A framing error desynchronizes the stream; report and
                // stop reading from this connection.
                let _ = tx.send(Err(err.into()));
                return;
            }
        }
    }
}

impl MessageTransport for ClientTransport {
    fn send(&self, frames: Vec<Bytes>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        lock(&self.writer).write_message(&frames)?;
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
        if let Some(duration) = *lock(&self.linger) {
            let _ = self.control.set_linger(Some(duration));
        }
        let _ = self.control.shutdown();
        if let Some(reader) = lock(&self.reader).take() {
            let _ = reader.join();
        }
        debug!(endpoint = ?self.endpoint, "client transport closed");
    }

    fn endpoint(&self) -> &Path {
        &self.endpoint
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcmux_transport::UnixEndpoint;

    fn temp_sock(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rpcmux-client-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("endpoint.sock")
    }

    #[test]
    fn connect_to_missing_endpoint_fails() {
        let result = ClientTransport::connect("/tmp/rpcmux-definitely-missing.sock");
        assert!(matches!(result, Err(SocketError::Transport(_))));
    }

    #[test]
    fn send_and_receive_messages() {
        let path = temp_sock("roundtrip");
        let endpoint = UnixEndpoint::bind(&path).unwrap();

        let client = ClientTransport::connect(&path).unwrap();
        let incoming = client.take_incoming().unwrap();
        assert!(client.take_incoming().is_none(), "queue handed over once");

        let server = std::thread::spawn(move || {
            let stream = endpoint.accept().unwrap();
            let mut reader = MessageReader::new(stream.try_clone().unwrap());
            let mut writer = MessageWriter::new(stream);

            let message = reader.read_message().unwrap();
            writer.write_message(&message).unwrap();
        });

        client
            .send(vec![Bytes::new(), Bytes::from_static(b"body")])
            .unwrap();

        let echoed = incoming.recv().unwrap().unwrap();
        assert_eq!(echoed.len(), 2);
        assert_eq!(echoed[1].as_ref(), b"body");

        server.join().unwrap();
        client.close();
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn close_disconnects_incoming_and_rejects_sends() {
        let path = temp_sock("close");
        let endpoint = UnixEndpoint::bind(&path).unwrap();

        let client = ClientTransport::connect(&path).unwrap();
        let _server_side = endpoint.accept().unwrap();
        let incoming = client.take_incoming().unwrap();

        client.close();
        client.close(); // idempotent

        assert!(matches!(
            client.send(vec![Bytes::from_static(b"x")]),
            Err(SocketError::Closed)
        ));
        assert!(incoming.recv().is_err(), "queue disconnects after close");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
