use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rpcmux_event::Event;
use tracing::info;

use crate::channel::{Channel, ChannelTable, MuxChannel};
use crate::context::SocketConfig;
use crate::error::{Result, SocketError};
use crate::heartbeat::HeartbeatSupervisor;
use crate::lock;
use crate::notify::{Notification, NotificationHub};
use crate::socket::Socket;
use crate::transport::{IncomingQueue, MessageTransport};

/// A socket multiplexing many logical conversations over one transport.
///
/// Each decoded inbound event is routed to the open channel named by its
/// `response_to` header, or surfaced as a new inbound request — strictly
/// one or the other. The channel table is guarded by a single lock per
/// handler invocation; routing for each event sees the table as of that
/// event's processing.
pub struct MultiplexingSocket {
    id: u64,
    socket: Socket,
    transport: Arc<dyn MessageTransport>,
    table: ChannelTable,
    notify: Arc<NotificationHub>,
    config: SocketConfig,
    supervisor: Mutex<Option<HeartbeatSupervisor>>,
    demux: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MultiplexingSocket {
    pub(crate) fn start(
        id: u64,
        transport: Arc<dyn MessageTransport>,
        config: SocketConfig,
    ) -> Result<Self> {
        let notify = Arc::new(NotificationHub::default());
        let socket = Socket::new(Arc::clone(&transport));
        let table: ChannelTable = Arc::new(Mutex::new(HashMap::new()));

        let incoming = transport.take_incoming().ok_or_else(|| {
            SocketError::Protocol("transport incoming queue already taken".to_string())
        })?;

        let demux = {
            let table = Arc::clone(&table);
            let notify = Arc::clone(&notify);
            std::thread::Builder::new()
                .name(format!("rpcmux-demux-{id}"))
                .spawn(move || demux_loop(incoming, table, notify))
                .map_err(rpcmux_transport::TransportError::Io)?
        };

        let supervisor = HeartbeatSupervisor::start(
            id,
            Arc::clone(&table),
            config.heartbeat_interval,
            config.debug_interval,
        )
        .map_err(rpcmux_transport::TransportError::Io)?;

        info!(socket = id, endpoint = ?transport.endpoint(), "multiplexing socket ready");

        Ok(Self {
            id,
            socket,
            transport,
            table,
            notify,
            config,
            supervisor: Mutex::new(Some(supervisor)),
            demux: Mutex::new(Some(demux)),
            closed: AtomicBool::new(false),
        })
    }

    /// The socket's process-wide identity. Diagnostics only.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The endpoint this socket is bound or connected to.
    pub fn endpoint(&self) -> &Path {
        self.transport.endpoint()
    }

    /// Subscribe to this socket's notifications, replacing any previous
    /// subscription. Dropping the receiver ends the subscription.
    pub fn notifications(&self) -> mpsc::Receiver<Notification> {
        self.notify.subscribe()
    }

    /// Send an event that is not correlated to an open channel.
    pub fn send(&self, event: &Event) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }
        self.socket.send(event)
    }

    /// Open a new channel.
    ///
    /// With an originating event, the channel is peer-initiated and bound
    /// to it; without, it is locally-initiated. Both get the socket's
    /// fixed per-channel capacity. The returned channel is in the table
    /// immediately.
    pub fn open_channel(&self, originating: Option<Event>) -> Result<Arc<MuxChannel>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::Closed);
        }

        let liveness_window = self.config.heartbeat_interval * 2;
        let channel = match originating {
            Some(event) => MuxChannel::remote(
                event,
                self.socket.clone(),
                Arc::downgrade(&self.table),
                self.config.channel_capacity,
                liveness_window,
            ),
            None => MuxChannel::local(
                self.socket.clone(),
                Arc::downgrade(&self.table),
                self.config.channel_capacity,
                liveness_window,
            ),
        };

        let mut table = lock(&self.table);
        match table.entry(channel.id().to_string()) {
            Entry::Occupied(_) => Err(SocketError::DuplicateChannel(channel.id().to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&channel) as Arc<dyn Channel>);
                Ok(channel)
            }
        }
    }

    /// Number of channels currently in the table.
    pub fn channel_count(&self) -> usize {
        lock(&self.table).len()
    }

    /// Close the socket. Terminal and idempotent.
    ///
    /// Applies the linger option to the transport, closes it, closes
    /// every channel currently in the table, and stops the heartbeat
    /// supervisor — no sweep runs after this returns.
    pub fn close(&self, linger: Option<Duration>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.transport.set_linger(linger);
        self.transport.close();

        // Snapshot, then close outside the lock: a channel's close
        // re-enters the table to remove itself.
        let channels: Vec<Arc<dyn Channel>> = lock(&self.table).values().cloned().collect();
        for channel in channels {
            channel.close();
        }

        if let Some(mut supervisor) = lock(&self.supervisor).take() {
            supervisor.stop();
        }
        if let Some(demux) = lock(&self.demux).take() {
            let _ = demux.join();
        }

        info!(socket = self.id, "socket closed");
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &ChannelTable {
        &self.table
    }
}

impl Drop for MultiplexingSocket {
    fn drop(&mut self) {
        self.close(None);
    }
}

fn demux_loop(incoming: IncomingQueue, table: ChannelTable, notify: Arc<NotificationHub>) {
    for item in incoming {
        let frames = match item {
            Ok(frames) => frames,
            Err(err) => {
                notify.emit(Notification::Error(err));
                continue;
            }
        };

        let event = match Socket::decode(frames) {
            Ok(event) => event,
            Err(err) => {
                // Message dropped; the socket stays usable.
                notify.emit(Notification::Error(err));
                continue;
            }
        };

        notify.emit(Notification::Received(event.clone()));

        let key = event.response_to().unwrap_or("");
        let target = lock(&table).get(key).cloned();
        match target {
            Some(channel) => channel.invoke(event),
            None => notify.emit(Notification::NewInboundRequest(event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::Value;

    use super::*;
    use crate::testing::{MockChannel, RecordingTransport};

    fn test_mux(transport: Arc<RecordingTransport>) -> MultiplexingSocket {
        MultiplexingSocket::start(
            7,
            transport as Arc<dyn MessageTransport>,
            SocketConfig::default(),
        )
        .unwrap()
    }

    fn drain(rx: &mpsc::Receiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.recv_timeout(Duration::from_millis(200)) {
            out.push(n);
        }
        out
    }

    #[test]
    fn routed_event_goes_only_to_its_channel() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        let channel = mux.open_channel(None).unwrap();
        let event = Event::correlated("work", vec![Value::from(1)], channel.id(), vec![]);
        transport.inject_event(&event);

        let delivered = channel
            .recv_timeout(Duration::from_secs(2))
            .expect("channel should receive the routed event");
        assert_eq!(delivered.name(), "work");

        let seen = drain(&notifications);
        assert!(seen
            .iter()
            .any(|n| matches!(n, Notification::Received(_))));
        assert!(!seen
            .iter()
            .any(|n| matches!(n, Notification::NewInboundRequest(_))));
    }

    #[test]
    fn unmatched_event_surfaces_as_new_inbound_request() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        let event = Event::new("hello", vec![]);
        transport.inject_event(&event);

        let seen = drain(&notifications);
        let inbound: Vec<_> = seen
            .iter()
            .filter(|n| matches!(n, Notification::NewInboundRequest(_)))
            .collect();
        assert_eq!(inbound.len(), 1);
    }

    #[test]
    fn event_for_unknown_channel_id_is_new_inbound() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        let channel = mux.open_channel(None).unwrap();
        let event = Event::correlated("stray", vec![], "someone-else", vec![]);
        transport.inject_event(&event);

        let seen = drain(&notifications);
        assert!(seen
            .iter()
            .any(|n| matches!(n, Notification::NewInboundRequest(_))));
        assert!(channel.try_recv().is_none());
    }

    #[test]
    fn bad_delimiter_is_one_error_and_nothing_else() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        transport.inject(vec![
            bytes::Bytes::from_static(b"not-a-delimiter"),
            bytes::Bytes::from_static(b"body"),
        ]);

        let seen = drain(&notifications);
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            Notification::Error(SocketError::Protocol(_))
        ));
    }

    #[test]
    fn undecodable_body_is_a_deserialization_error() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        transport.inject(vec![bytes::Bytes::new(), bytes::Bytes::from_static(b"{no")]);

        let seen = drain(&notifications);
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            seen[0],
            Notification::Error(SocketError::Deserialization(_))
        ));
    }

    #[test]
    fn transport_receive_errors_are_surfaced() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        transport.inject_error(SocketError::Wire(rpcmux_wire::WireError::InvalidMagic));

        let seen = drain(&notifications);
        assert!(matches!(
            seen[0],
            Notification::Error(SocketError::Wire(_))
        ));
    }

    #[test]
    fn open_channel_yields_distinct_ids_present_in_table() {
        let transport = RecordingTransport::new();
        let mux = test_mux(transport);

        let mut ids = std::collections::HashSet::new();
        for _ in 0..5 {
            let channel = mux.open_channel(None).unwrap();
            assert!(ids.insert(channel.id().to_string()));
            assert_eq!(mux.channel_count(), ids.len());
        }
    }

    #[test]
    fn duplicate_channel_id_is_rejected() {
        let transport = RecordingTransport::new();
        let mux = test_mux(transport);

        let originating = Event::correlated("hello", vec![], "dup", vec![]);
        let first = mux.open_channel(Some(originating.clone())).unwrap();
        assert_eq!(first.id(), "dup");

        let second = mux.open_channel(Some(originating));
        assert!(matches!(second, Err(SocketError::DuplicateChannel(_))));
        assert_eq!(mux.channel_count(), 1);
    }

    #[test]
    fn peer_initiated_channel_keeps_its_originating_event() {
        let transport = RecordingTransport::new();
        let mux = test_mux(transport);

        let originating = Event::new("hello", vec![Value::from("payload")]);
        let channel = mux.open_channel(Some(originating.clone())).unwrap();

        assert_eq!(channel.originating_event(), Some(&originating));
    }

    #[test]
    fn close_tears_everything_down_exactly_once() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));

        let a = MockChannel::new("a");
        let b = MockChannel::new("b");
        {
            let mut table = crate::lock(mux.table());
            table.insert("a".to_string(), Arc::clone(&a) as Arc<dyn Channel>);
            table.insert("b".to_string(), Arc::clone(&b) as Arc<dyn Channel>);
        }

        mux.close(Some(Duration::from_millis(100)));

        assert!(transport.is_closed());
        assert_eq!(
            *crate::lock(&transport.linger),
            Some(Duration::from_millis(100))
        );
        assert_eq!(a.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(crate::lock(&mux.supervisor).is_none());

        // Idempotent: a second close changes nothing.
        mux.close(None);
        assert_eq!(a.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn closed_socket_rejects_sends_and_opens() {
        let transport = RecordingTransport::new();
        let mux = test_mux(transport);
        mux.close(None);

        assert!(matches!(
            mux.send(&Event::new("late", vec![])),
            Err(SocketError::Closed)
        ));
        assert!(matches!(
            mux.open_channel(None),
            Err(SocketError::Closed)
        ));
    }

    #[test]
    fn send_failure_is_recoverable() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));

        transport
            .fail_sends
            .store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(mux.send(&Event::new("doomed", vec![])).is_err());

        transport
            .fail_sends
            .store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(mux.send(&Event::new("fine", vec![])).is_ok());
        assert_eq!(transport.sent_events().len(), 1);
    }

    #[test]
    fn routing_uses_table_state_at_processing_time() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let notifications = mux.notifications();

        // First event arrives before any channel exists.
        let early = Event::correlated("early", vec![], "late-channel", vec![]);
        transport.inject_event(&early);
        let seen = drain(&notifications);
        assert!(seen
            .iter()
            .any(|n| matches!(n, Notification::NewInboundRequest(_))));

        // A channel opened from that event then receives the follow-up.
        let channel = mux.open_channel(Some(early)).unwrap();
        let followup = Event::correlated("followup", vec![], "late-channel", vec![]);
        transport.inject_event(&followup);

        let delivered = channel
            .recv_timeout(Duration::from_secs(2))
            .expect("follow-up should route to the now-open channel");
        assert_eq!(delivered.name(), "followup");
    }

    #[test]
    fn liveness_window_follows_heartbeat_interval() {
        let transport = RecordingTransport::new();
        let config = SocketConfig {
            heartbeat_interval: Duration::from_millis(50),
            ..SocketConfig::default()
        };
        let mux =
            MultiplexingSocket::start(9, transport as Arc<dyn MessageTransport>, config).unwrap();

        let channel = mux.open_channel(None).unwrap();
        let opened = channel.opened_at();
        assert!(!channel.is_non_responsive(opened + Duration::from_millis(80)));
        assert!(channel.is_non_responsive(opened + Duration::from_millis(150)));
    }

    #[test]
    fn incoming_queue_is_handed_over_once() {
        let transport = RecordingTransport::new();
        let _mux = test_mux(Arc::clone(&transport));

        let again = MultiplexingSocket::start(
            8,
            transport as Arc<dyn MessageTransport>,
            SocketConfig::default(),
        );
        assert!(matches!(again, Err(SocketError::Protocol(_))));
    }

    #[test]
    fn events_route_in_arrival_order() {
        let transport = RecordingTransport::new();
        let mux = test_mux(Arc::clone(&transport));
        let channel = mux.open_channel(None).unwrap();

        for i in 0..32 {
            let event = Event::correlated(format!("e{i}"), vec![], channel.id(), vec![]);
            transport.inject_event(&event);
        }

        for i in 0..32 {
            let delivered = channel
                .recv_timeout(Duration::from_millis(500))
                .expect("every injected event should arrive");
            assert_eq!(delivered.name(), format!("e{i}"));
        }
    }
}
