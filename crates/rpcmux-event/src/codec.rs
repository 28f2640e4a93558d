use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::event::Event;

/// Serialize an event into its wire frames: envelope, one empty
/// delimiter frame, one JSON body frame.
pub fn serialize(event: &Event) -> Result<Vec<Bytes>> {
    let body = serde_json::to_vec(&(event.header(), event.name(), event.args()))?;

    let mut frames = Vec::with_capacity(event.envelope().len() + 2);
    frames.extend_from_slice(event.envelope());
    frames.push(Bytes::new());
    frames.push(Bytes::from(body));
    Ok(frames)
}

/// Deserialize an event from its envelope frames and body frame.
///
/// The body must be the JSON triple `[header, name, args]` with an
/// object header, string name, and array args; anything else is a
/// decoding error, never a panic.
pub fn deserialize(envelope: Vec<Bytes>, body: &[u8]) -> Result<Event> {
    let (header, name, args): (Map<String, Value>, String, Vec<Value>) =
        serde_json::from_slice(body)?;
    Ok(Event::from_parts(header, name, args).attach_envelope(envelope))
}
