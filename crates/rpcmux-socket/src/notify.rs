use std::sync::mpsc;
use std::sync::Mutex;

use rpcmux_event::Event;
use tracing::debug;

use crate::error::SocketError;
use crate::lock;

/// An observable condition surfaced by a socket to its owning
/// application or RPC dispatch layer.
#[derive(Debug)]
pub enum Notification {
    /// A recoverable error: protocol violation, decode failure, or a
    /// transport-level receive failure. The socket stays usable.
    Error(SocketError),
    /// A successfully decoded event, observed before routing.
    Received(Event),
    /// A decoded event that matched no open channel.
    NewInboundRequest(Event),
}

/// Delivers notifications to at most one subscriber.
///
/// Subscribing replaces any previous subscription; dropping the receiver
/// silently discards further notifications.
#[derive(Default)]
pub(crate) struct NotificationHub {
    sender: Mutex<Option<mpsc::Sender<Notification>>>,
}

impl NotificationHub {
    pub fn subscribe(&self) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel();
        *lock(&self.sender) = Some(tx);
        rx
    }

    pub fn emit(&self, notification: Notification) {
        let mut guard = lock(&self.sender);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(notification).is_err() {
                    // Receiver dropped; subscription is over.
                    *guard = None;
                }
            }
            None => {
                if let Notification::Error(err) = &notification {
                    debug!(error = %err, "dropping error notification (no subscriber)");
                }
            }
        }
    }
}
