//! # Event Log Writer
//!
//! Captures a live stream to the file format [`FileEventSource`] replays:
//!
//! ```text
//! [4 bytes: record length (big-endian u32)]
//! [N bytes: encoded BusEvent]
//! ```
//!
//! Append-only, no checksum, no index.
//!
//! [`FileEventSource`]: crate::FileEventSource

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use shared_types::framing::encode_frame;
use shared_types::{BusEvent, BusResult, Event};
use tracing::debug;

struct LogWriter {
    writer: BufWriter<File>,
    /// Current end of the log.
    offset: u64,
}

pub struct EventLogWriter {
    path: PathBuf,
    writer: Mutex<LogWriter>,
}

impl EventLogWriter {
    /// Open (or create) the log at `path`, appending after existing records.
    pub fn open(path: &Path) -> BusResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = file.metadata()?.len();
        debug!(path = %path.display(), offset, "Event log opened");

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                writer: BufWriter::new(file),
                offset,
            }),
        })
    }

    /// Append one record. Returns the byte offset it starts at.
    pub fn append(&self, bus_event: &BusEvent) -> BusResult<u64> {
        let frame = encode_frame(&bus_event.encode()?)?;

        let mut w = self.writer.lock();
        let record_offset = w.offset;
        w.writer.write_all(&frame)?;
        w.offset += frame.len() as u64;
        Ok(record_offset)
    }

    pub fn append_event(&self, event: &Event) -> BusResult<u64> {
        self.append(&event.to_bus_event())
    }

    /// Push buffered records to the OS.
    pub fn flush(&self) -> BusResult<()> {
        self.writer.lock().writer.flush()?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
