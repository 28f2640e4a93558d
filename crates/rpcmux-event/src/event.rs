use bytes::Bytes;
use serde_json::{Map, Value};

/// Header key: unique id of this event.
pub const KEY_MESSAGE_ID: &str = "message_id";

/// Header key: correlation id naming the channel a reply belongs to.
pub const KEY_RESPONSE_TO: &str = "response_to";

/// Header key: protocol version.
pub const KEY_VERSION: &str = "v";

/// Current protocol version, carried in every locally created event.
pub const PROTOCOL_VERSION: u64 = 3;

/// A message unit exchanged over the transport.
///
/// Immutable once constructed. The envelope is the run of opaque routing
/// frames the event arrived with (or should leave with); it never enters
/// the body encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    header: Map<String, Value>,
    name: String,
    args: Vec<Value>,
    envelope: Vec<Bytes>,
}

impl Event {
    /// Create a new event with a fresh `message_id` and version header.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        let mut header = Map::new();
        header.insert(
            KEY_MESSAGE_ID.to_string(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
        header.insert(KEY_VERSION.to_string(), Value::from(PROTOCOL_VERSION));
        Self {
            header,
            name: name.into(),
            args,
            envelope: Vec::new(),
        }
    }

    /// Create an event correlated to a channel: `response_to` is set to
    /// the channel id and the envelope routes it back to the peer.
    pub fn correlated(
        name: impl Into<String>,
        args: Vec<Value>,
        channel_id: &str,
        envelope: Vec<Bytes>,
    ) -> Self {
        let mut event = Self::new(name, args);
        event
            .header
            .insert(KEY_RESPONSE_TO.to_string(), Value::from(channel_id));
        event.envelope = envelope;
        event
    }

    /// Create a reply to `original`, correlated to its channel id and
    /// carrying its routing envelope.
    pub fn reply_to(original: &Event, name: impl Into<String>, args: Vec<Value>) -> Self {
        match original.correlation_id() {
            Some(channel_id) => {
                Self::correlated(name, args, channel_id, original.envelope.clone())
            }
            None => {
                let mut event = Self::new(name, args);
                event.envelope = original.envelope.clone();
                event
            }
        }
    }

    /// Assemble an event from an explicit header (decoded input, tests).
    pub fn from_parts(header: Map<String, Value>, name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            header,
            name: name.into(),
            args,
            envelope: Vec::new(),
        }
    }

    pub(crate) fn attach_envelope(mut self, envelope: Vec<Bytes>) -> Self {
        self.envelope = envelope;
        self
    }

    /// The header mapping. Keys are case-sensitive strings.
    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered application payload.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The routing envelope frames this event arrived with.
    pub fn envelope(&self) -> &[Bytes] {
        &self.envelope
    }

    /// The `message_id` header, if present and a string.
    pub fn message_id(&self) -> Option<&str> {
        self.header.get(KEY_MESSAGE_ID).and_then(Value::as_str)
    }

    /// The `response_to` header, if present and a string.
    pub fn response_to(&self) -> Option<&str> {
        self.header.get(KEY_RESPONSE_TO).and_then(Value::as_str)
    }

    /// The id of the channel this event belongs to: `response_to` when
    /// present, else the event's own `message_id` (a channel-opening
    /// request names the conversation by its first message id).
    pub fn correlation_id(&self) -> Option<&str> {
        self.response_to().or_else(|| self.message_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_carries_id_and_version() {
        let event = Event::new("ping", vec![]);
        assert!(event.message_id().is_some());
        assert_eq!(
            event.header().get(KEY_VERSION).and_then(Value::as_u64),
            Some(PROTOCOL_VERSION)
        );
        assert!(event.response_to().is_none());
        assert!(event.envelope().is_empty());
    }

    #[test]
    fn distinct_events_get_distinct_message_ids() {
        let a = Event::new("ping", vec![]);
        let b = Event::new("ping", vec![]);
        assert_ne!(a.message_id(), b.message_id());
    }

    #[test]
    fn correlated_event_names_its_channel() {
        let event = Event::correlated("add", vec![Value::from(1)], "chan-7", vec![]);
        assert_eq!(event.response_to(), Some("chan-7"));
        assert_eq!(event.correlation_id(), Some("chan-7"));
    }

    #[test]
    fn correlation_falls_back_to_message_id() {
        let event = Event::new("hello", vec![]);
        assert_eq!(event.correlation_id(), event.message_id());
    }

    #[test]
    fn reply_inherits_channel_and_envelope() {
        let request = Event::correlated("add", vec![], "chan-9", vec![Bytes::from_static(b"id")]);
        let reply = Event::reply_to(&request, "result", vec![Value::from(3)]);

        assert_eq!(reply.response_to(), Some("chan-9"));
        assert_eq!(reply.envelope(), request.envelope());
        assert_ne!(reply.message_id(), request.message_id());
    }

    #[test]
    fn reply_to_uncorrelatable_event_has_no_response_to() {
        let bare = Event::from_parts(Map::new(), "hello", vec![]);
        let reply = Event::reply_to(&bare, "result", vec![]);
        assert!(reply.response_to().is_none());
    }
}
