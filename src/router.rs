//! Correlation of outbound requests with inbound replies.
//!
//! Every outbound JSON object carries an `id`; a caller that wants the
//! reply registers a callback under that id. The callback goes into the
//! pending table *before* the frame is handed to the writer, so even a
//! reply racing the send cannot be lost.
//!
//! Inbound messages are resolved in order: a pending id consumes its
//! callback (exactly once), an `action` field becomes a command request for
//! the host dispatcher, and anything else is logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;

use crate::dispatch::{CommandDispatcher, CommandRequest, ReplyHandle};
use crate::error::Result;
use crate::message::{generate_message_id, Message};
use crate::protocol::{encode_frame, Opcode};
use crate::writer::WriterHandle;

/// Callback invoked with the reply to a correlated request.
pub type ResponseCallback = Box<dyn FnOnce(Message) + Send + 'static>;

/// A request awaiting its reply.
struct PendingRequest {
    callback: ResponseCallback,
    registered_at: Instant,
}

/// Routes decoded messages and owns the pending-request table.
pub(crate) struct MessageRouter {
    pending: Mutex<HashMap<String, PendingRequest>>,
    dispatcher: Arc<dyn CommandDispatcher>,
    writer: WriterHandle,
}

impl MessageRouter {
    pub fn new(writer: WriterHandle, dispatcher: Arc<dyn CommandDispatcher>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            dispatcher,
            writer,
        }
    }

    /// Serialize and transmit one message, returning the id it went out
    /// under (objects only; other values carry none).
    ///
    /// A JSON object without an `id` gets a generated one. A send reusing a
    /// live id overwrites the earlier pending slot; only the later callback
    /// will ever fire.
    pub async fn send(
        &self,
        mut value: Value,
        callback: Option<ResponseCallback>,
    ) -> Result<Option<String>> {
        let id = match &mut value {
            Value::Object(map) => Some(match map.get("id").and_then(Value::as_str) {
                Some(existing) => existing.to_string(),
                None => {
                    let generated = generate_message_id();
                    map.insert("id".to_string(), Value::String(generated.clone()));
                    generated
                }
            }),
            _ => None,
        };

        if let Some(callback) = callback {
            match &id {
                Some(id) => self.register(id.clone(), callback),
                None => {
                    tracing::warn!("callback ignored: only object messages carry an id");
                }
            }
        }

        let text = serde_json::to_string(&value)?;
        let frame = Bytes::from(encode_frame(text.as_bytes(), Opcode::Text));

        if let Err(err) = self.writer.send(frame).await {
            // The frame never left; the registration must not outlive it.
            if let Some(id) = &id {
                self.pending.lock().remove(id);
            }
            return Err(err);
        }

        Ok(id)
    }

    /// Insert before transmit; see module docs for the race this closes.
    fn register(&self, id: String, callback: ResponseCallback) {
        let previous = self.pending.lock().insert(
            id.clone(),
            PendingRequest {
                callback,
                registered_at: Instant::now(),
            },
        );
        if previous.is_some() {
            tracing::warn!(id = %id, "duplicate message id overwrote an earlier pending callback");
        }
    }

    /// Route one decoded inbound message.
    pub fn route(&self, message: Message) {
        if let Some(id) = message.reply_id().map(str::to_owned) {
            let pending = self.pending.lock().remove(&id);
            if let Some(pending) = pending {
                tracing::debug!(
                    id = %id,
                    waited = ?pending.registered_at.elapsed(),
                    "resolving pending request"
                );
                (pending.callback)(message);
                return;
            }
            // An id already consumed (or never registered) is unrelated;
            // fall through to the action check.
        }

        if let Some(action) = message.action().map(str::to_owned) {
            let id = message.reply_id().map(str::to_owned);
            let request = CommandRequest {
                action,
                params: message.params(),
                id: id.clone(),
            };
            let reply = ReplyHandle::new(id, self.writer.clone());
            // Fire-and-forget: the dispatcher defers onto its own context.
            self.dispatcher.handle(request, reply);
            return;
        }

        tracing::warn!(?message, "dropping unrecognized message");
    }

    /// Number of requests still awaiting a reply.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every pending request without invoking its callback. Called at
    /// connection teardown; callers needing liveness guarantees wrap their
    /// own timeout around `send`.
    pub fn clear_pending(&self) {
        let drained: Vec<(String, PendingRequest)> = self.pending.lock().drain().collect();
        for (id, request) in &drained {
            tracing::debug!(
                id = %id,
                age = ?request.registered_at.elapsed(),
                "discarding pending request at teardown"
            );
        }
    }
}
