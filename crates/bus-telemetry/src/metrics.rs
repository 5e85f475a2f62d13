//! Prometheus metrics for the event bus.
//!
//! All metrics follow the naming convention: `bus_<component>_<metric>_<unit>`
//!
//! Updates are fire-and-forget: nothing in the bus reads these values back.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROKER METRICS
    // =========================================================================

    /// Events handed to at least the fan-out pass of the broker
    pub static ref EVENTS_SENT: IntCounter = IntCounter::new(
        "bus_events_sent_total",
        "Total events published through the in-process broker"
    ).expect("metric creation failed");

    /// Events dropped for an optional subscriber with a full inbox
    pub static ref EVENTS_DROPPED: IntCounter = IntCounter::new(
        "bus_events_dropped_total",
        "Events dropped because an optional subscriber was full"
    ).expect("metric creation failed");

    /// Currently registered broker subscriptions
    pub static ref SUBSCRIBERS_ACTIVE: IntGauge = IntGauge::new(
        "bus_subscribers_active",
        "Number of active broker subscriptions"
    ).expect("metric creation failed");

    // =========================================================================
    // SOCKET METRICS
    // =========================================================================

    pub static ref SOCKET_MESSAGES_SENT: IntCounter = IntCounter::new(
        "bus_socket_messages_sent_total",
        "Messages written to the replication socket"
    ).expect("metric creation failed");

    pub static ref SOCKET_MESSAGES_RECEIVED: IntCounter = IntCounter::new(
        "bus_socket_messages_received_total",
        "Messages read from the replication socket"
    ).expect("metric creation failed");

    pub static ref SOCKET_DIAL_FAILURES: IntCounter = IntCounter::new(
        "bus_socket_dial_failures_total",
        "Failed attempts to dial the replication socket"
    ).expect("metric creation failed");

    // =========================================================================
    // STORE DISPATCH METRICS
    // =========================================================================

    /// Events pushed to storage writers, by event type
    pub static ref STORE_EVENTS_DISPATCHED: IntCounterVec = IntCounterVec::new(
        Opts::new("bus_store_events_dispatched_total", "Events pushed to storage writers"),
        &["event_type"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broker
        Box::new(EVENTS_SENT.clone()),
        Box::new(EVENTS_DROPPED.clone()),
        Box::new(SUBSCRIBERS_ACTIVE.clone()),
        // Socket
        Box::new(SOCKET_MESSAGES_SENT.clone()),
        Box::new(SOCKET_MESSAGES_RECEIVED.clone()),
        Box::new(SOCKET_DIAL_FAILURES.clone()),
        // Store
        Box::new(STORE_EVENTS_DISPATCHED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_encode_contains_bus_metrics() {
        register_metrics().unwrap();
        EVENTS_SENT.inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("bus_events_sent_total"));
    }

    #[test]
    fn test_gauge_set() {
        SUBSCRIBERS_ACTIVE.set(3);
        assert_eq!(SUBSCRIBERS_ACTIVE.get(), 3);
    }
}
