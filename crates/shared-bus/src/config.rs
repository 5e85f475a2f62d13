//! Broker configuration.

use serde::{Deserialize, Serialize};

/// Default capacity of the broker command queue.
pub const DEFAULT_EVENT_CHANNEL_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Commands (sends, subscribes, barriers) that may be queued for the
    /// broker task before callers start waiting.
    pub event_channel_buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            event_channel_buffer_size: DEFAULT_EVENT_CHANNEL_BUFFER_SIZE,
        }
    }
}
