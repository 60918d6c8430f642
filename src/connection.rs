//! Connection lifecycle: state machine, background receive loop, teardown.
//!
//! One [`Connection`] owns one TCP socket. The upgrade handshake runs in
//! [`Connection::connect`]; on success exactly one receive task and one
//! writer task are spawned and an application-level handshake message
//! (client identity and version, distinct from the HTTP upgrade) goes out.
//!
//! The receive loop reads under a bounded per-iteration timeout. A timeout
//! is "no data yet, keep polling"; a zero-length read is "peer closed". The
//! loop also re-checks a shutdown flag between iterations, so a
//! `disconnect` is noticed within one read-timeout interval even with no
//! traffic. There is no hard cancellation primitive; closing the transport
//! and the flag together bound every exit path.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use wsbridge_client::{ConnectConfig, Connection, NoopDispatcher};
//!
//! #[tokio::main]
//! async fn main() -> wsbridge_client::Result<()> {
//!     let conn = Connection::connect(ConnectConfig::default(), Arc::new(NoopDispatcher)).await?;
//!
//!     conn.send_with_callback(json!({"action": "get_scene_info"}), |reply| {
//!         println!("controller answered: {reply:?}");
//!     })
//!     .await?;
//!
//!     conn.disconnect().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ConnectConfig;
use crate::dispatch::CommandDispatcher;
use crate::error::{Result, WsBridgeError};
use crate::handshake;
use crate::message::Message;
use crate::protocol::{encode_frame, FrameBuffer, Opcode};
use crate::router::{MessageRouter, ResponseCallback};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Read buffer size for the receive loop.
const READ_CHUNK_LEN: usize = 4096;

/// Connection lifecycle state. Owned by the [`Connection`]; everything else
/// only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport. Initial and terminal state.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Receive loop running; sends accepted.
    Open,
    /// Goodbye frames in flight; transport about to close.
    Closing,
}

/// Application-level hello sent right after the transport handshake.
#[derive(Debug, Serialize)]
struct HelloMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    client: &'a str,
    version: &'a str,
}

/// State shared between the connection handle and its background tasks.
struct Shared {
    state: Mutex<ConnectionState>,
    shutdown: AtomicBool,
    router: MessageRouter,
    writer: WriterHandle,
    config: ConnectConfig,
}

impl Shared {
    /// Terminal transition: mark Disconnected and drop every pending
    /// request without invoking its callback.
    fn teardown(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
        self.router.clear_pending();
    }
}

/// A live (or once-live) connection to the controller.
pub struct Connection {
    shared: Arc<Shared>,
    shutdown_rx: oneshot::Receiver<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl Connection {
    /// Open the transport, perform the upgrade handshake, start the
    /// background tasks, and send the application-level hello.
    ///
    /// On any failure nothing is left running and the error states which
    /// stage failed ([`WsBridgeError::Transport`] or
    /// [`WsBridgeError::Handshake`]).
    pub async fn connect(
        config: ConnectConfig,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Result<Self> {
        tracing::debug!(host = %config.host, port = config.port, "connecting");

        let (stream, leftover) =
            handshake::perform(&config.host, config.port, config.connect_timeout).await?;

        let hello = serde_json::to_value(HelloMessage {
            kind: "handshake",
            client: &config.client_name,
            version: &config.client_version,
        })?;

        let (read_half, write_half) = stream.into_split();
        let (writer, writer_task) = spawn_writer_task(write_half);
        let router = MessageRouter::new(writer.clone(), dispatcher);

        let shared = Arc::new(Shared {
            state: Mutex::new(ConnectionState::Connecting),
            shutdown: AtomicBool::new(false),
            router,
            writer,
            config,
        });

        // Open before the loop starts, so an immediate peer close cannot be
        // overwritten back to Open by this task.
        *shared.state.lock() = ConnectionState::Open;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let loop_shared = shared.clone();
        tokio::spawn(async move {
            receive_loop(read_half, leftover, &loop_shared).await;
            loop_shared.teardown();
            let _ = shutdown_tx.send(());
        });

        let connection = Connection {
            shared,
            shutdown_rx,
            _writer_task: writer_task,
        };

        if let Err(err) = connection.shared.router.send(hello, None).await {
            connection.disconnect().await;
            return Err(err);
        }

        tracing::debug!("connection open");
        Ok(connection)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Requests still awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.router.pending_len()
    }

    /// Send a JSON message without expecting a reply. Objects get an `id`
    /// assigned when missing; the id used is returned.
    pub async fn send(&self, value: Value) -> Result<Option<String>> {
        self.ensure_open()?;
        self.shared.router.send(value, None).await
    }

    /// Send a JSON message and register `callback` for its reply.
    ///
    /// The callback runs on the receive task when a message with the same
    /// id arrives; it is invoked at most once and never after the
    /// connection reaches Disconnected. Callers needing a liveness bound
    /// wrap their own timeout around this.
    pub async fn send_with_callback(
        &self,
        value: Value,
        callback: impl FnOnce(Message) + Send + 'static,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        let callback: ResponseCallback = Box::new(callback);
        self.shared.router.send(value, Some(callback)).await
    }

    /// Graceful close: best-effort goodbye (application-level disconnect
    /// notice, then a close frame), a short grace delay for the flush, then
    /// unconditional transport close. Idempotent once Disconnected.
    pub async fn disconnect(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Closing;
        }
        tracing::debug!("disconnecting");
        self.shared.shutdown.store(true, Ordering::Release);

        let notice = serde_json::json!({
            "type": "disconnect",
            "client": self.shared.config.client_name,
        });
        let _ = self.shared.router.send(notice, None).await;
        let _ = self
            .shared
            .writer
            .send(Bytes::from(encode_frame(&[], Opcode::Close)))
            .await;

        tokio::time::sleep(self.shared.config.close_grace).await;
        self.shared.writer.close().await;

        self.shared.teardown();
    }

    /// Block until the receive loop has stopped (peer close, I/O error, or
    /// a prior `disconnect`).
    pub async fn wait_for_shutdown(self) {
        let _ = self.shutdown_rx.await;
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            _ => Err(WsBridgeError::ConnectionClosed),
        }
    }
}

/// Why the receive loop should keep going or stop.
enum Flow {
    Continue,
    Stop,
}

/// The single background receive loop: read, reassemble, route.
async fn receive_loop(mut reader: OwnedReadHalf, leftover: Vec<u8>, shared: &Shared) {
    let mut frame_buffer = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_LEN];

    // Bytes the handshake read past the HTTP response belong to us.
    let mut flow = process_bytes(&mut frame_buffer, &leftover, shared);

    while matches!(flow, Flow::Continue) {
        if shared.shutdown.load(Ordering::Acquire) {
            tracing::debug!("receive loop stopping on shutdown flag");
            break;
        }

        match timeout(shared.config.read_timeout, reader.read(&mut chunk)).await {
            // No data within the bound: liveness poll, go around again.
            Err(_elapsed) => continue,
            Ok(Ok(0)) => {
                tracing::debug!("peer closed the transport");
                break;
            }
            Ok(Ok(n)) => {
                flow = process_bytes(&mut frame_buffer, &chunk[..n], shared);
            }
            Ok(Err(err)) => {
                tracing::error!("receive loop read error: {err}");
                break;
            }
        }
    }
}

/// Feed one chunk through the reassembler and route every complete frame.
fn process_bytes(frame_buffer: &mut FrameBuffer, data: &[u8], shared: &Shared) -> Flow {
    let frames = match frame_buffer.push(data) {
        Ok(frames) => frames,
        Err(err) => {
            // The stream is unreliable past this point; stop rather than
            // guess at the next frame boundary.
            tracing::error!("dropping connection on protocol error: {err}");
            return Flow::Stop;
        }
    };

    for frame in frames {
        match frame.opcode {
            Opcode::Close => {
                tracing::debug!("peer sent close frame");
                return Flow::Stop;
            }
            Opcode::Ping | Opcode::Pong => {
                // Observed, never answered (no auto-pong in this subset).
                tracing::debug!(opcode = ?frame.opcode, "ignoring control frame");
            }
            Opcode::Text | Opcode::Binary => {
                shared.router.route(Message::from_frame(frame));
            }
        }
    }

    Flow::Continue
}
