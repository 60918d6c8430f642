//! Logical messages decoded from frame payloads.
//!
//! A text frame is decoded as UTF-8 and then tentatively parsed as JSON:
//! valid JSON becomes [`Message::Json`], a plain string stays
//! [`Message::Text`], and invalid UTF-8 degrades to [`Message::Binary`].
//! Binary frames always yield raw bytes. Decode failures are therefore
//! never fatal: the payload is delivered as-is at the best fidelity
//! available.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use wsbridge_client::message::Message;
//! use wsbridge_client::protocol::{Frame, Opcode};
//!
//! let frame = Frame {
//!     fin: true,
//!     opcode: Opcode::Text,
//!     masked: false,
//!     payload: Bytes::from_static(br#"{"id":"abc","success":true}"#),
//! };
//!
//! let message = Message::from_frame(frame);
//! assert_eq!(message.reply_id(), Some("abc"));
//! ```

use bytes::Bytes;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::protocol::{Frame, Opcode};

/// Length of generated correlation ids.
pub const MESSAGE_ID_LEN: usize = 12;

/// The logical unit delivered to application code.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A parsed JSON value (the common case for controller traffic).
    Json(Value),
    /// Valid UTF-8 that did not parse as JSON.
    Text(String),
    /// Raw bytes: a binary frame, or text that was not valid UTF-8.
    Binary(Bytes),
}

impl Message {
    /// Decode a data frame's payload into a message.
    pub fn from_frame(frame: Frame) -> Self {
        match frame.opcode {
            Opcode::Text => match String::from_utf8(frame.payload.to_vec()) {
                Ok(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(value) => Message::Json(value),
                    Err(_) => Message::Text(text),
                },
                Err(err) => Message::Binary(Bytes::from(err.into_bytes())),
            },
            _ => Message::Binary(frame.payload),
        }
    }

    /// The correlation id, when this is a JSON object carrying `id`.
    pub fn reply_id(&self) -> Option<&str> {
        self.field("id")
    }

    /// The command name, when this is a JSON object carrying `action`.
    pub fn action(&self) -> Option<&str> {
        self.field("action")
    }

    /// The command parameters; `Null` when absent or not an object message.
    pub fn params(&self) -> Value {
        match self {
            Message::Json(Value::Object(map)) => {
                map.get("params").cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        match self {
            Message::Json(Value::Object(map)) => map.get(name).and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Generate a random 12-character alphanumeric correlation id.
///
/// 62^12 possible tokens makes a per-connection collision negligible;
/// uniqueness is not tracked.
pub fn generate_message_id() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(MESSAGE_ID_LEN)
        .map(char::from)
        .collect()
}
