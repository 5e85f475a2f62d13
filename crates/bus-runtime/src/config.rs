//! # Bus Configuration
//!
//! Unified configuration for every bus component.
//!
//! Loaded from TOML, one table per component; durations are integer
//! milliseconds. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! [socket]
//! enabled = true
//! address = "10.0.0.7"
//! dial_retry_interval = 500
//!
//! [source]
//! use_event_file = true
//! expected_fan_out_subscribers = 2
//!
//! [source.file]
//! file_path = "/var/lib/bus/events.log"
//! time_between_blocks = 100
//!
//! [store]
//! use_sequential_dispatch = true
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use bus_telemetry::TelemetryConfig;
use event_sources::FileSourceConfig;
use serde::{Deserialize, Serialize};
use shared_bus::BrokerConfig;
use socket_transport::{SocketConfig, TransportKind};
use sql_store_broker::SqlBrokerConfig;
use thiserror::Error;
use tracing::warn;

/// Complete bus configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub telemetry: TelemetryConfig,
    pub broker: BrokerConfig,
    pub socket: SocketConfig,
    pub source: SourceConfig,
    pub store: SqlBrokerConfig,
    pub core: CoreConfig,
}

/// Where the data node reads events from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Replay `file` instead of listening on the socket.
    pub use_event_file: bool,
    pub file: FileSourceConfig,
    /// Consumers sharing the source through the fan-out.
    pub expected_fan_out_subscribers: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            use_event_file: false,
            file: FileSourceConfig::default(),
            expected_fan_out_subscribers: 1,
        }
    }
}

/// Core node extras.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Capture every published event into a replayable log.
    pub event_log_path: Option<PathBuf>,
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroBuffer(&'static str),

    #[error("use_event_file is set but source.file.file_path is empty")]
    MissingEventFile,

    #[error("expected_fan_out_subscribers must be at least 1")]
    NoFanOutSubscribers,
}

impl BusConfig {
    /// Load a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse bus configuration")
    }

    /// Apply `BUS_*` environment overrides.
    ///
    /// # Environment Variables
    ///
    /// - `BUS_SOCKET_ENABLED`, `BUS_SOCKET_ADDRESS`, `BUS_SOCKET_PORT`,
    ///   `BUS_SOCKET_TRANSPORT` (`tcp` | `inproc`)
    /// - `BUS_USE_EVENT_FILE`, `BUS_EVENT_FILE`, `BUS_TIME_BETWEEN_BLOCKS_MS`
    /// - `BUS_FAN_OUT_SUBSCRIBERS`
    /// - `BUS_SEQUENTIAL_DISPATCH`
    /// - `BUS_EVENT_LOG`
    /// - logging variables, see [`TelemetryConfig::with_env_overrides`]
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
        self.telemetry = std::mem::take(&mut self.telemetry).with_env_overrides();
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = parse_var(&lookup, "BUS_SOCKET_ENABLED", parse_bool) {
            self.socket.enabled = enabled;
        }
        if let Some(address) = lookup("BUS_SOCKET_ADDRESS") {
            self.socket.address = address;
        }
        if let Some(port) = parse_var(&lookup, "BUS_SOCKET_PORT", |v| u16::from_str(v).ok()) {
            self.socket.port = port;
        }
        if let Some(transport) = parse_var(&lookup, "BUS_SOCKET_TRANSPORT", parse_transport) {
            self.socket.transport = transport;
        }
        if let Some(use_file) = parse_var(&lookup, "BUS_USE_EVENT_FILE", parse_bool) {
            self.source.use_event_file = use_file;
        }
        if let Some(path) = lookup("BUS_EVENT_FILE") {
            self.source.file.file_path = PathBuf::from(path);
        }
        let parse_ms = |v: &str| u64::from_str(v).ok();
        if let Some(ms) = parse_var(&lookup, "BUS_TIME_BETWEEN_BLOCKS_MS", parse_ms) {
            self.source.file.time_between_blocks = std::time::Duration::from_millis(ms);
        }
        let parse_count = |v: &str| usize::from_str(v).ok();
        if let Some(n) = parse_var(&lookup, "BUS_FAN_OUT_SUBSCRIBERS", parse_count) {
            self.source.expected_fan_out_subscribers = n;
        }
        if let Some(sequential) = parse_var(&lookup, "BUS_SEQUENTIAL_DISPATCH", parse_bool) {
            self.store.use_sequential_dispatch = sequential;
        }
        if let Some(path) = lookup("BUS_EVENT_LOG") {
            self.core.event_log_path = Some(PathBuf::from(path));
        }
    }

    /// Reject settings no component can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let buffers = [
            ("broker.event_channel_buffer_size", self.broker.event_channel_buffer_size),
            ("socket.event_channel_buffer_size", self.socket.event_channel_buffer_size),
            ("socket.socket_channel_buffer_size", self.socket.socket_channel_buffer_size),
            ("source.file.buffer_size", self.source.file.buffer_size),
            ("store.dispatch_buffer_size", self.store.dispatch_buffer_size),
        ];
        if let Some((name, _)) = buffers.iter().find(|(_, size)| *size == 0) {
            return Err(ConfigError::ZeroBuffer(*name));
        }
        if self.source.use_event_file && self.source.file.file_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingEventFile);
        }
        if self.source.expected_fan_out_subscribers == 0 {
            return Err(ConfigError::NoFanOutSubscribers);
        }
        Ok(())
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(name)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(var = name, value = %raw, "Ignoring invalid environment override");
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_transport(value: &str) -> Option<TransportKind> {
    match value.to_lowercase().as_str() {
        "tcp" => Some(TransportKind::Tcp),
        "inproc" => Some(TransportKind::InProc),
        _ => None,
    }
}
