//! # Event Sources
//!
//! Producers of event streams consumed by the data node.
//!
//! - [`FileEventSource`]: replay a captured binary log from the start.
//! - [`FanOutEventSource`]: replicate any source to a fixed set of consumers.
//! - [`EventLogWriter`]: capture a live stream in the format the file source reads.
//!
//! The socket-backed source lives in `socket-transport`.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod fan_out;
pub mod file;
pub mod source;
pub mod writer;

pub use config::FileSourceConfig;
pub use fan_out::FanOutEventSource;
pub use file::FileEventSource;
pub use source::{EventSource, SourceStreams};
pub use writer::EventLogWriter;
