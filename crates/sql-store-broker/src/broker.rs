//! # SQL Store Broker
//!
//! Drives one [`EventSource`] and hands every event to the storage writers
//! that declared interest in its type. Writers are registered up front; the
//! routing table is frozen once [`SqlStoreBroker::receive`] starts.

use std::sync::Arc;

use event_sources::EventSource;
use parking_lot::Mutex;
use shared_types::{BusError, BusResult, FatalError, ShutdownSignal};
use tracing::{error, info};

use crate::chain::{ChainCheck, ChainInfo};
use crate::config::SqlBrokerConfig;
use crate::dispatch::{run_concurrent, run_sequential, Registered};
use crate::subscriber::StoreSubscriber;

#[derive(Default)]
struct Registry {
    subscribers: Vec<Registered>,
    started: bool,
}

pub struct SqlStoreBroker {
    config: SqlBrokerConfig,
    source: Arc<dyn EventSource>,
    chain_info: Arc<dyn ChainInfo>,
    registry: Mutex<Registry>,
}

impl SqlStoreBroker {
    pub fn new(
        config: SqlBrokerConfig,
        source: Arc<dyn EventSource>,
        chain_info: Arc<dyn ChainInfo>,
    ) -> Self {
        Self {
            config,
            source,
            chain_info,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Register a writer.
    ///
    /// Fails with [`FatalError::SubscribedAfterStart`] once `receive` ran.
    pub fn subscribe(&self, subscriber: Arc<dyn StoreSubscriber>) -> BusResult<()> {
        let mut registry = self.registry.lock();
        if registry.started {
            error!("Store subscriber registered after dispatch started");
            return Err(FatalError::SubscribedAfterStart.into());
        }
        registry.subscribers.push(Registered::new(subscriber));
        Ok(())
    }

    /// Consume the source until it ends, an error occurs, or shutdown.
    ///
    /// Returns the chain id mismatch, the first writer error, or the error
    /// the source left behind when it ran dry.
    pub async fn receive(&self, shutdown: ShutdownSignal) -> BusResult<()> {
        let table = {
            let mut registry = self.registry.lock();
            if registry.started {
                return Err(BusError::Store("dispatch already started".to_string()));
            }
            registry.started = true;
            registry.subscribers.clone()
        };

        let mut streams = self.source.receive(shutdown.clone()).await?;
        let mut chain = ChainCheck::new(self.chain_info.as_ref());
        info!(
            subscribers = table.len(),
            sequential = self.config.use_sequential_dispatch,
            "Store dispatch started"
        );

        let result = if self.config.use_sequential_dispatch {
            run_sequential(&table, &mut streams, &mut chain, shutdown).await
        } else {
            run_concurrent(
                &table,
                self.config.dispatch_buffer_size,
                &mut streams,
                &mut chain,
                shutdown,
            )
            .await
        };

        match &result {
            Ok(()) => info!("Store dispatch stopped"),
            Err(e) => error!(error = %e, "Store dispatch failed"),
        }
        result
    }
}
