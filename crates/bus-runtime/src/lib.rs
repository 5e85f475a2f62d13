//! # Bus Runtime
//!
//! Assembles the bus crates into the two node roles and supervises them.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration (`BusConfig::load`, then `apply_env`)
//! 2. Validate it
//! 3. Initialize logging and metrics
//! 4. Start the [`CorePipeline`] and/or the [`DataNodePipeline`]
//! 5. Run until the [`Supervisor`] signals shutdown

#![allow(clippy::type_complexity)]

pub mod config;
pub mod core_node;
pub mod data_node;
pub mod supervisor;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

pub use crate::config::{BusConfig, ConfigError, CoreConfig, SourceConfig};
pub use crate::core_node::CorePipeline;
pub use crate::data_node::DataNodePipeline;
pub use crate::supervisor::Supervisor;

/// Load, override, validate, and install telemetry.
pub fn bootstrap(path: Option<&Path>) -> Result<BusConfig> {
    let mut config = match path {
        Some(path) => BusConfig::load(path)?,
        None => BusConfig::default(),
    };
    config.apply_env();
    config.validate().context("Invalid bus configuration")?;

    bus_telemetry::init_telemetry(&config.telemetry).context("Failed to initialize telemetry")?;
    info!(
        service = %config.telemetry.service_name,
        socket = %config.socket.endpoint(),
        transport = %config.socket.transport,
        "Bus configuration loaded"
    );
    Ok(config)
}
