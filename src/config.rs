//! Connection configuration.
//!
//! Target host/port and the bounded timeouts every transport wait runs
//! under. Where these values come from (preferences UI, env, flags) is the
//! host's business; they arrive here as plain fields.

use std::time::Duration;

/// Default controller endpoint.
pub const DEFAULT_HOST: &str = "localhost";

/// Default controller port.
pub const DEFAULT_PORT: u16 = 8765;

/// Parameters for establishing and running one connection.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Controller hostname or address.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// Bound on TCP connect and on the upgrade-response read.
    pub connect_timeout: Duration,
    /// Per-iteration bound on receive-loop reads; also the worst-case
    /// latency for a cooperative shutdown to be noticed.
    pub read_timeout: Duration,
    /// Grace delay after the goodbye frames before the transport is closed.
    pub close_grace: Duration,
    /// Client name reported in the application-level handshake message.
    pub client_name: String,
    /// Client version reported in the application-level handshake message.
    pub client_version: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            close_grace: Duration::from_millis(200),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
