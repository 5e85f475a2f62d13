//! # Core Node Pipeline
//!
//! ```text
//! publish(batch) → Sequencer → Broker ───────→ local subscribers
//!                            ├→ SocketClient → data node
//!                            └→ EventLogWriter (optional capture)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use event_sources::EventLogWriter;
use shared_bus::{Broker, Sequencer, Subscriber, SubscriptionId};
use shared_types::{BusResult, Event};
use socket_transport::SocketClient;
use tracing::{info, warn};

use crate::config::BusConfig;
use crate::supervisor::Supervisor;

pub struct CorePipeline {
    sequencer: Sequencer,
    broker: Broker,
    socket: SocketClient,
    capture: Option<EventLogWriter>,
    supervisor: Arc<Supervisor>,
}

impl CorePipeline {
    /// Start the broker and connect the socket client.
    ///
    /// With the socket enabled this waits until the data node is reachable.
    pub async fn start(config: &BusConfig, supervisor: Arc<Supervisor>) -> Result<Self> {
        let broker = Broker::new(&config.broker, supervisor.signal());
        let socket = SocketClient::connect(&config.socket, supervisor.signal())
            .await
            .context("Failed to connect socket client")?;
        let capture = match &config.core.event_log_path {
            Some(path) => Some(
                EventLogWriter::open(path)
                    .with_context(|| format!("Failed to open event log {}", path.display()))?,
            ),
            None => None,
        };

        info!(
            replicate = socket.is_enabled(),
            capture = capture.is_some(),
            "Core pipeline started"
        );
        Ok(Self {
            sequencer: Sequencer::new(),
            broker,
            socket,
            capture,
            supervisor,
        })
    }

    pub async fn subscribe(
        &self,
        subscriber: Arc<dyn Subscriber>,
        required: bool,
    ) -> BusResult<SubscriptionId> {
        self.broker.subscribe(subscriber, required).await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) {
        self.broker.unsubscribe(id).await;
    }

    #[must_use]
    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Sequence one block's batch and hand it to every outlet.
    ///
    /// Local fan-out never fails the call. Every batch reaches both the
    /// local broker and the replication socket before capture is attempted.
    /// A replication error wins over a capture error; fatal ones also shut
    /// the supervisor down.
    pub async fn publish(&self, events: Vec<Event>) -> BusResult<Vec<Arc<Event>>> {
        let events = self.sequencer.set_sequence(events);
        if events.is_empty() {
            return Ok(events);
        }

        self.broker.send_batch(events.clone()).await;

        let replicated = self.socket.send_batch(&events).await;
        self.supervisor.observe(&replicated);
        let captured = self.capture(&events);

        replicated?;
        captured.map(|()| events)
    }

    fn capture(&self, events: &[Arc<Event>]) -> BusResult<()> {
        let Some(capture) = &self.capture else {
            return Ok(());
        };
        for event in events {
            if let Err(e) = capture.append_event(event) {
                warn!(error = %e, path = %capture.path().display(), "Event capture failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Drain queued work, then release the socket and the capture file.
    pub async fn shutdown(self) -> BusResult<()> {
        self.broker.shutdown().await;
        self.socket.close().await;
        if let Some(capture) = &self.capture {
            capture.flush()?;
        }
        info!("Core pipeline stopped");
        Ok(())
    }
}
