//! # Shared Bus - In-Process Event Distribution
//!
//! Publishes sequenced events to every local consumer of the node's output.
//!
//! ```text
//! ┌──────────────┐ set_sequence() ┌──────────────┐  send()   ┌──────────────┐
//! │   Producer   │ ─────────────→ │  Sequencer   │ ────────→ │    Broker    │
//! └──────────────┘                └──────────────┘           └──────┬───────┘
//!                                                                   │ fan-out
//!                                              ┌────────────────────┼─────────┐
//!                                              ▼                    ▼         ▼
//!                                        required sub        optional sub    ...
//! ```
//!
//! ## Delivery guarantees
//!
//! - **Required** subscribers block the fan-out until they accept an event.
//! - **Optional** subscribers get one non-blocking attempt; a full inbox
//!   drops the event for that subscriber only.
//! - Fan-outs are serialized; per-subscriber order is submission order.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod config;
pub mod sequencer;
pub mod subscriber;

// Re-export main types
pub use broker::{Broker, SubscriptionId};
pub use config::BrokerConfig;
pub use sequencer::{Sequencer, TRACKED_BLOCKS};
pub use subscriber::{accepts, ChannelSubscriber, Subscriber, SubscriberState};
