//! # SQL Store Broker
//!
//! The data node's persistence dispatcher.
//!
//! ```text
//!                        ┌───────────────────────┐
//! EventSource ─────────→ │     SqlStoreBroker    │
//!                        │  chain id check       │
//!                        └──────────┬────────────┘
//!            sequential: one loop   │   concurrent: one worker per type
//!                 ┌─────────────────┼─────────────────┐
//!                 ▼                 ▼                 ▼
//!            trade writer      order writer     catch-all writer
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod chain;
pub mod config;
mod dispatch;
pub mod subscriber;

pub use broker::SqlStoreBroker;
pub use chain::{ChainInfo, InMemoryChainInfo};
pub use config::SqlBrokerConfig;
pub use subscriber::StoreSubscriber;
