//! # Data Node Pipeline
//!
//! ```text
//! SocketServer ─┐                      ┌→ SqlStoreBroker → storage writers
//!               ├→ FanOutEventSource ──┤
//! FileEventSource┘                     └→ other consumers (via source())
//! ```
//!
//! The SQL dispatcher is always one of the fan-out's consumers; forwarding
//! starts once all `expected_fan_out_subscribers` have called `receive`.

use std::sync::Arc;

use event_sources::{EventSource, FanOutEventSource, FileEventSource};
use shared_types::BusResult;
use socket_transport::SocketServer;
use sql_store_broker::{ChainInfo, SqlStoreBroker, StoreSubscriber};
use tracing::info;

use crate::config::BusConfig;
use crate::supervisor::Supervisor;

pub struct DataNodePipeline {
    fan_out: Arc<FanOutEventSource>,
    store: SqlStoreBroker,
}

impl DataNodePipeline {
    /// Build the configured upstream: the event file or the socket server.
    #[must_use]
    pub fn new(config: &BusConfig, chain_info: Arc<dyn ChainInfo>) -> Self {
        let upstream: Arc<dyn EventSource> = if config.source.use_event_file {
            info!(path = %config.source.file.file_path.display(), "Data node replaying event file");
            Arc::new(FileEventSource::new(config.source.file.clone()))
        } else {
            info!(addr = %config.socket.endpoint(), "Data node receiving from socket");
            Arc::new(SocketServer::new(config.socket.clone()))
        };
        Self::with_upstream(config, upstream, chain_info)
    }

    #[must_use]
    pub fn with_upstream(
        config: &BusConfig,
        upstream: Arc<dyn EventSource>,
        chain_info: Arc<dyn ChainInfo>,
    ) -> Self {
        let fan_out = Arc::new(FanOutEventSource::new(
            upstream,
            config.source.expected_fan_out_subscribers,
            config.socket.socket_channel_buffer_size,
        ));
        let store = SqlStoreBroker::new(
            config.store.clone(),
            Arc::clone(&fan_out) as Arc<dyn EventSource>,
            chain_info,
        );
        Self { fan_out, store }
    }

    /// The shared source, for consumers other than the SQL dispatcher.
    #[must_use]
    pub fn source(&self) -> Arc<FanOutEventSource> {
        Arc::clone(&self.fan_out)
    }

    /// Register a storage writer. Only valid before [`run`](Self::run).
    pub fn subscribe(&self, writer: Arc<dyn StoreSubscriber>) -> BusResult<()> {
        self.store.subscribe(writer)
    }

    /// Set up the upstream source, e.g. bind the socket.
    pub async fn listen(&self) -> BusResult<()> {
        self.fan_out.listen().await
    }

    /// Dispatch until the source ends, an error occurs, or shutdown.
    ///
    /// Fatal errors are reported to `supervisor`, which stops every other
    /// component sharing its signal.
    pub async fn run(&self, supervisor: &Supervisor) -> BusResult<()> {
        let listened = self.listen().await;
        if supervisor.observe(&listened) {
            return listened;
        }
        listened?;

        let result = self.store.receive(supervisor.signal()).await;
        supervisor.observe(&result);
        result
    }
}
