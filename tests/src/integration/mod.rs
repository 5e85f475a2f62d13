//! Integration scenarios and their shared fixtures.

pub mod replay;
pub mod replication;
pub mod supervision;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{BusResult, Event, EventType};
use sql_store_broker::StoreSubscriber;

/// Storage writer that records `(writer, event id)` into a shared log.
pub struct RecordingWriter {
    name: &'static str,
    types: Vec<EventType>,
    log: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl RecordingWriter {
    pub fn new(
        name: &'static str,
        types: Vec<EventType>,
        log: &Arc<Mutex<Vec<(&'static str, String)>>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            types,
            log: Arc::clone(log),
        })
    }
}

#[async_trait]
impl StoreSubscriber for RecordingWriter {
    fn types(&self) -> Vec<EventType> {
        self.types.clone()
    }

    async fn push(&self, event: Arc<Event>) -> BusResult<()> {
        self.log.lock().push((self.name, event.id()));
        Ok(())
    }
}

/// Ids recorded for one writer, in arrival order.
pub fn ids_for(log: &Mutex<Vec<(&'static str, String)>>, name: &str) -> Vec<String> {
    log.lock()
        .iter()
        .filter(|(who, _)| *who == name)
        .map(|(_, id)| id.clone())
        .collect()
}

/// One block's worth of unsequenced events.
pub fn block(block_nr: i64, kinds: &[EventType]) -> Vec<Event> {
    kinds
        .iter()
        .map(|kind| {
            Event::new(*kind, format!("block-{block_nr}"), vec![block_nr as u8])
                .with_block_nr(block_nr)
                .with_chain_id("testnet")
        })
        .collect()
}
