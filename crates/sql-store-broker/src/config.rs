//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPATCH_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlBrokerConfig {
    /// One global order across all types instead of one worker per type.
    pub use_sequential_dispatch: bool,

    /// Capacity of each per-type queue in concurrent mode.
    pub dispatch_buffer_size: usize,
}

impl Default for SqlBrokerConfig {
    fn default() -> Self {
        Self {
            use_sequential_dispatch: false,
            dispatch_buffer_size: DEFAULT_DISPATCH_BUFFER_SIZE,
        }
    }
}
