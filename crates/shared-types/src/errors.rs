//! # Error Types
//!
//! Error taxonomy shared by every crate of the bus.
//!
//! - [`FatalError`]: an invariant violation after which the affected component
//!   must not process anything else. The top-level supervisor turns these
//!   into a controlled shutdown.
//! - Every other [`BusError`] variant is either transient (logged and
//!   retried by the component) or terminal for one source only.
//!
//! All errors are `Clone` so that one upstream failure can be forwarded
//! verbatim to every fan-out consumer.

use thiserror::Error;

/// Conditions that stop the process' event processing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// The peer violated the wire protocol.
    #[error("Malformed wire protocol: {0}")]
    BadProtocol(String),

    /// The transport reported the socket closed.
    #[error("Socket closed by transport")]
    SocketClosed,

    /// A fan-out source received more consumers than it was declared with.
    #[error("Fan-out source expects {expected} subscribers, receive was called again")]
    TooManySubscribers { expected: usize },

    /// A dispatcher subscriber was registered after consumption started.
    #[error("Subscriber registered after dispatch started")]
    SubscribedAfterStart,

    /// The socket client could not enqueue events for too long.
    #[error("Socket sender stuck after {timeouts} consecutive queue timeouts")]
    SenderStuck { timeouts: u32 },
}

/// Errors produced by the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// File or socket I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Envelope (de)serialization failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A length prefix announced a record larger than allowed.
    #[error("Frame of {size} bytes exceeds maximum of {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Envelope version not supported.
    #[error("Unsupported envelope version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u32, supported: u32 },

    /// The envelope id is not `"<blockNr>-<sequence>"`.
    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    /// An event belongs to a different chain than the one being stored.
    #[error("Mismatched chain id received: {received}, want {expected}")]
    ChainIdMismatch { received: String, expected: String },

    /// A storage writer failed to persist an event.
    #[error("Store error: {0}")]
    Store(String),

    /// Recoverable transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The component was shut down.
    #[error("Shut down")]
    Shutdown,

    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl BusError {
    /// Returns true for errors the supervisor must act on.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// The fatal cause, if any.
    #[must_use]
    pub fn as_fatal(&self) -> Option<&FatalError> {
        match self {
            Self::Fatal(fatal) => Some(fatal),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Convenience alias used throughout the bus crates.
pub type BusResult<T> = Result<T, BusError>;
