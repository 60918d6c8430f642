//! The command-execution boundary.
//!
//! The core decodes and routes; what a command *does* belongs to the host.
//! Inbound action messages are handed to a [`CommandDispatcher`] as a
//! [`CommandRequest`] plus a [`ReplyHandle`] for the correlated response.
//! The router never waits on the dispatcher: `handle` must return promptly,
//! deferring real work onto whatever execution context the host owns, and
//! call the reply handle from there when a result exists.
//!
//! # Example
//!
//! ```ignore
//! struct SceneDispatcher;
//!
//! impl CommandDispatcher for SceneDispatcher {
//!     fn handle(&self, request: CommandRequest, reply: ReplyHandle) {
//!         tokio::spawn(async move {
//!             let result = run_on_main_thread(request.action, request.params).await;
//!             let _ = match result {
//!                 Ok(body) => reply.respond(true, body).await,
//!                 Err(message) => reply.error(&message).await,
//!             };
//!         });
//!     }
//! }
//! ```

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::protocol::{encode_frame, Opcode};
use crate::writer::WriterHandle;

/// One decoded command request: `{action, params, id}`.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Command name from the message's `action` field.
    pub action: String,
    /// Parameters from the `params` field; `Null` when absent.
    pub params: Value,
    /// Correlation id, when the controller expects a response.
    pub id: Option<String>,
}

/// Host-side command executor.
///
/// Invoked at most once per inbound action message, on the connection's
/// receive task. Implementations must not block it.
pub trait CommandDispatcher: Send + Sync + 'static {
    /// Take ownership of one command. Fire-and-forget from the router's
    /// point of view; respond (if `request.id` is present) via `reply`.
    fn handle(&self, request: CommandRequest, reply: ReplyHandle);
}

/// A dispatcher that drops every command, for hosts that only issue
/// requests and never serve them.
pub struct NoopDispatcher;

impl CommandDispatcher for NoopDispatcher {
    fn handle(&self, request: CommandRequest, _reply: ReplyHandle) {
        tracing::warn!(action = %request.action, "no dispatcher configured, dropping command");
    }
}

/// Handle for sending the `{id, success, ...}` response to one command.
///
/// `Clone` and `Send`, so a host can carry it onto its own executor.
#[derive(Clone)]
pub struct ReplyHandle {
    id: Option<String>,
    writer: Option<WriterHandle>,
}

impl ReplyHandle {
    pub(crate) fn new(id: Option<String>, writer: WriterHandle) -> Self {
        Self {
            id,
            writer: Some(writer),
        }
    }

    /// A reply handle wired to nothing, for exercising dispatchers in tests.
    pub fn detached(id: Option<String>) -> Self {
        Self { id, writer: None }
    }

    /// The correlation id of the request this handle answers.
    pub fn request_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Send `{id, success, ..body}`. A non-object body lands under a
    /// `result` key. No-op when the request carried no id, since there is
    /// nothing for the controller to correlate the response to.
    pub async fn respond(&self, success: bool, body: Value) -> Result<()> {
        let (Some(id), Some(writer)) = (&self.id, &self.writer) else {
            return Ok(());
        };

        let mut object = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        object.insert("id".to_string(), Value::String(id.clone()));
        object.insert("success".to_string(), Value::Bool(success));

        let text = serde_json::to_string(&Value::Object(object))?;
        writer
            .send(Bytes::from(encode_frame(text.as_bytes(), Opcode::Text)))
            .await
    }

    /// Send a failure response carrying an `error` message.
    pub async fn error(&self, message: &str) -> Result<()> {
        self.respond(false, serde_json::json!({ "error": message }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_frame, Frame};
    use crate::writer::spawn_writer_task;
    use serde_json::json;
    use tokio::io::{duplex, AsyncReadExt};

    async fn read_one_frame(server: &mut (impl AsyncReadExt + Unpin)) -> Frame {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let n = server.read(&mut buf).await.unwrap();
            received.extend_from_slice(&buf[..n]);
            if let Some(decoded) = decode_frame(&received).unwrap() {
                return decoded.frame;
            }
        }
    }

    #[tokio::test]
    async fn test_respond_builds_correlated_response() {
        let (client, mut server) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client);

        let reply = ReplyHandle::new(Some("req-42-token".to_string()), writer);
        reply
            .respond(true, json!({"output": "done"}))
            .await
            .unwrap();

        let frame = read_one_frame(&mut server).await;
        let value: Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(value["id"], "req-42-token");
        assert_eq!(value["success"], true);
        assert_eq!(value["output"], "done");
    }

    #[tokio::test]
    async fn test_non_object_body_lands_under_result() {
        let (client, mut server) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client);

        let reply = ReplyHandle::new(Some("abc".to_string()), writer);
        reply.respond(true, json!(17)).await.unwrap();

        let frame = read_one_frame(&mut server).await;
        let value: Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(value["result"], 17);
        assert_eq!(value["success"], true);
    }

    #[tokio::test]
    async fn test_error_reply_shape() {
        let (client, mut server) = duplex(4096);
        let (writer, _task) = spawn_writer_task(client);

        let reply = ReplyHandle::new(Some("abc".to_string()), writer);
        reply.error("unknown action: fly").await.unwrap();

        let frame = read_one_frame(&mut server).await;
        let value: Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "unknown action: fly");
    }

    #[tokio::test]
    async fn test_respond_without_id_is_a_noop() {
        let (client, mut server) = duplex(4096);
        let (writer, task) = spawn_writer_task(client);

        let reply = ReplyHandle::new(None, writer.clone());
        reply.respond(true, json!({"ignored": true})).await.unwrap();

        // Nothing was written: closing the writer yields an empty stream.
        writer.close().await;
        task.await.unwrap().unwrap();
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_detached_handle_never_fails() {
        let reply = ReplyHandle::detached(Some("abc".to_string()));
        assert_eq!(reply.request_id(), Some("abc"));
        assert!(reply.respond(true, json!({})).await.is_ok());
        assert!(reply.error("nope").await.is_ok());
    }
}
