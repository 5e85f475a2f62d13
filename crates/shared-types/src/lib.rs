//! # Shared Types Crate
//!
//! Everything that travels on the event bus, and the vocabulary every bus
//! component shares.
//!
//! ## Contents
//!
//! - [`Event`] / [`EventType`]: the in-process event and its type tag.
//! - [`BusEvent`]: the versioned wire envelope used on disk and on the socket.
//! - [`framing`]: `[u32 BE length][payload]` record framing.
//! - [`BusError`] / [`FatalError`]: the error taxonomy.
//! - [`ShutdownSignal`]: process-wide cancellation observed by every task.

pub mod envelope;
pub mod errors;
pub mod event;
pub mod framing;
pub mod shutdown;

pub use envelope::{BusEvent, BUS_EVENT_VERSION};
pub use errors::{BusError, BusResult, FatalError};
pub use event::{Event, EventType};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
