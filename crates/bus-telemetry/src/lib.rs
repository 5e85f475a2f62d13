//! # Bus Telemetry
//!
//! Logging and metrics shared by every event-bus crate.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, human-readable or JSON
//! - **Metrics**: Prometheus collectors in a process-wide registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bus_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BUS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BUS_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `BUS_SERVICE_NAME` | `event-bus` | Service name attached to startup logs |

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, register_metrics, EVENTS_DROPPED, EVENTS_SENT, SOCKET_DIAL_FAILURES,
    SOCKET_MESSAGES_RECEIVED, SOCKET_MESSAGES_SENT, STORE_EVENTS_DISPATCHED, SUBSCRIBERS_ACTIVE,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the global tracing subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    register_metrics()?;
    init_tracing(config)
}
