//! Socket transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

use crate::transport::TransportKind;

pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_DIAL_RETRY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SOCKET_QUEUE_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MAX_SEND_TIMEOUTS: u32 = 10;
pub const DEFAULT_EVENT_CHANNEL_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_SOCKET_CHANNEL_BUFFER_SIZE: usize = 256;
pub const DEFAULT_PORT: u16 = 3005;

/// Shared by both ends of the replication socket.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Upper bound on a single dial attempt.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dial_timeout: Duration,

    /// Wait between failed dial attempts.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub dial_retry_interval: Duration,

    /// How long the client waits for room in its outbound queue.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub socket_queue_timeout: Duration,

    /// Consecutive queue timeouts before the client reports itself stuck.
    pub max_send_timeouts: u32,

    /// Client outbound queue capacity.
    pub event_channel_buffer_size: usize,

    /// Server inbound channel capacity.
    pub socket_channel_buffer_size: usize,

    /// Bind address on the server, dial address on the client.
    pub address: String,
    pub port: u16,
    pub transport: TransportKind,

    /// A disabled client is inert.
    pub enabled: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            dial_retry_interval: DEFAULT_DIAL_RETRY_INTERVAL,
            socket_queue_timeout: DEFAULT_SOCKET_QUEUE_TIMEOUT,
            max_send_timeouts: DEFAULT_MAX_SEND_TIMEOUTS,
            event_channel_buffer_size: DEFAULT_EVENT_CHANNEL_BUFFER_SIZE,
            socket_channel_buffer_size: DEFAULT_SOCKET_CHANNEL_BUFFER_SIZE,
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            transport: TransportKind::Tcp,
            enabled: false,
        }
    }
}

impl SocketConfig {
    /// `address:port` for TCP, the bare address for in-process endpoints.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.transport {
            TransportKind::Tcp => format!("{}:{}", self.address, self.port),
            TransportKind::InProc => self.address.clone(),
        }
    }

    /// In-process endpoint, mostly for tests.
    #[must_use]
    pub fn inproc(name: &str) -> Self {
        Self {
            address: name.to_string(),
            port: 0,
            transport: TransportKind::InProc,
            enabled: true,
            ..Self::default()
        }
    }
}
