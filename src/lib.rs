//! # wsbridge-client
//!
//! Hand-rolled WebSocket client for hosts that cannot link a networking
//! stack but can open a TCP socket. Exchanges bidirectional, correlated
//! JSON commands with a co-located controller.
//!
//! ## Architecture
//!
//! - **Transport handshake** (`handshake`): one HTTP/1.1 upgrade exchange
//!   over a fresh TCP socket.
//! - **Wire protocol** (`protocol`): frame encode/decode with per-frame
//!   masking and variable-length headers, plus reassembly of frames from
//!   arbitrary read boundaries.
//! - **Messages** (`message`, `router`): JSON payloads correlated by `id`;
//!   unsolicited `action` messages go to a host-supplied dispatcher.
//! - **Connection** (`connection`): state machine, one background receive
//!   loop, serialized writes.
//!
//! Deliberate protocol subset (trusted local peer): no TLS, no compression
//! extensions, no continuation-frame assembly, no automatic pong replies,
//! and the handshake accept-hash is not verified.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use serde_json::json;
//! use wsbridge_client::{ConnectConfig, Connection, NoopDispatcher};
//!
//! #[tokio::main]
//! async fn main() -> wsbridge_client::Result<()> {
//!     let config = ConnectConfig {
//!         host: "127.0.0.1".into(),
//!         port: 8765,
//!         ..ConnectConfig::default()
//!     };
//!     let conn = Connection::connect(config, Arc::new(NoopDispatcher)).await?;
//!
//!     conn.send_with_callback(json!({"action": "get_scene_info"}), |reply| {
//!         println!("{reply:?}");
//!     })
//!     .await?;
//!
//!     conn.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handshake;
pub mod message;
pub mod protocol;

mod connection;
mod router;
mod writer;

pub use config::ConnectConfig;
pub use connection::{Connection, ConnectionState};
pub use dispatch::{CommandDispatcher, CommandRequest, NoopDispatcher, ReplyHandle};
pub use error::{Result, WsBridgeError};
pub use message::Message;
pub use router::ResponseCallback;
