//! File replay configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};

/// Default capacity of the replayed event channel.
pub const DEFAULT_FILE_BUFFER_SIZE: usize = 1024;

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSourceConfig {
    /// Log of `[u32 BE length][BusEvent]` records.
    pub file_path: PathBuf,

    /// Pause inserted at every block transition during replay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub time_between_blocks: Duration,

    pub buffer_size: usize,
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::new(),
            time_between_blocks: Duration::ZERO,
            buffer_size: DEFAULT_FILE_BUFFER_SIZE,
        }
    }
}

impl FileSourceConfig {
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_time_between_blocks(mut self, pause: Duration) -> Self {
        self.time_between_blocks = pause;
        self
    }
}
