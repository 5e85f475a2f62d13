//! The event source port.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{BusError, BusResult, Event, ShutdownSignal};
use tokio::sync::mpsc;

/// Channels handed to a consumer by [`EventSource::receive`].
///
/// Errors travel separately from events. A source that hits a terminal
/// error puts it on `errors` before closing `events`, so a consumer that
/// sees `events` end can check `errors` without waiting.
#[derive(Debug)]
pub struct SourceStreams {
    pub events: mpsc::Receiver<Arc<Event>>,
    pub errors: mpsc::Receiver<BusError>,
}

impl SourceStreams {
    /// Fresh bounded pair plus the sending halves.
    #[must_use]
    pub fn channel(
        buffer_size: usize,
    ) -> (
        Self,
        mpsc::Sender<Arc<Event>>,
        mpsc::Sender<BusError>,
    ) {
        let (events_tx, events) = mpsc::channel(buffer_size.max(1));
        let (errors_tx, errors) = mpsc::channel(1);
        (Self { events, errors }, events_tx, errors_tx)
    }

    /// Pending error after the event stream ended, without waiting.
    pub fn take_error(&mut self) -> Option<BusError> {
        self.errors.try_recv().ok()
    }
}

/// A producer of events consumed from process start.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// One-time setup. Calls after the first successful one are no-ops.
    async fn listen(&self) -> BusResult<()>;

    /// Start producing for one consumer.
    ///
    /// Every long-running task started here exits once `shutdown` fires.
    async fn receive(&self, shutdown: ShutdownSignal) -> BusResult<SourceStreams>;
}
