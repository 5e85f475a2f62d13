//! # Socket Transport
//!
//! Replicates bus events from the core node to a data node.
//!
//! ```text
//! core node                                      data node
//! ┌──────────────┐  queue  ┌──────────────┐  push/pull  ┌──────────────┐
//! │ SocketClient │ ──────→ │ SocketSender │ ──────────→ │ SocketServer │ → EventSource
//! └──────────────┘         └──────────────┘             └──────────────┘
//! ```
//!
//! One message on the wire is exactly one encoded `BusEvent`. Delivery is
//! at-most-once: nothing is acknowledged or retransmitted.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod config;
pub mod sender;
pub mod server;
pub mod transport;

pub use client::SocketClient;
pub use config::SocketConfig;
pub use sender::SocketSender;
pub use server::SocketServer;
pub use transport::{PullSocket, PushSocket, TransportKind};
