//! Event data model and wire codec for rpcmux.
//!
//! An [`Event`] is the unit of exchange between sockets: a header map
//! carrying correlation metadata, an event name, and an ordered argument
//! list. On the wire an event is a run of opaque routing frames (the
//! envelope), one empty delimiter frame, and one body frame holding the
//! JSON-encoded `[header, name, args]` triple.

pub mod codec;
pub mod error;
pub mod event;

pub use codec::{deserialize, serialize};
pub use error::{EventError, Result};
pub use event::{Event, KEY_MESSAGE_ID, KEY_RESPONSE_TO, KEY_VERSION, PROTOCOL_VERSION};
