//! # Chain Identity
//!
//! A data node stores events of exactly one chain. The first event carrying
//! a chain id fixes it when nothing is stored yet; every later event must
//! match.

use parking_lot::RwLock;
use shared_types::{BusError, BusResult, Event};
use tracing::info;

/// Persistent record of which chain this store belongs to.
pub trait ChainInfo: Send + Sync {
    fn chain_id(&self) -> BusResult<Option<String>>;
    fn set_chain_id(&self, chain_id: &str) -> BusResult<()>;
}

/// [`ChainInfo`] kept in memory, for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct InMemoryChainInfo {
    chain_id: RwLock<Option<String>>,
}

impl InMemoryChainInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chain_id(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: RwLock::new(Some(chain_id.into())),
        }
    }
}

impl ChainInfo for InMemoryChainInfo {
    fn chain_id(&self) -> BusResult<Option<String>> {
        Ok(self.chain_id.read().clone())
    }

    fn set_chain_id(&self, chain_id: &str) -> BusResult<()> {
        *self.chain_id.write() = Some(chain_id.to_string());
        Ok(())
    }
}

/// Per-receive cache in front of a [`ChainInfo`].
pub(crate) struct ChainCheck<'a> {
    info: &'a dyn ChainInfo,
    known: Option<String>,
}

impl<'a> ChainCheck<'a> {
    pub(crate) fn new(info: &'a dyn ChainInfo) -> Self {
        Self { info, known: None }
    }

    /// Events without a chain id pass unchecked.
    pub(crate) fn check(&mut self, event: &Event) -> BusResult<()> {
        let received = event.chain_id();
        if received.is_empty() {
            return Ok(());
        }

        if self.known.is_none() {
            let stored = match self.info.chain_id()? {
                Some(stored) => stored,
                None => {
                    self.info.set_chain_id(received)?;
                    info!(chain_id = received, "Chain id recorded from first event");
                    received.to_string()
                }
            };
            self.known = Some(stored);
        }

        let expected = self.known.as_deref().unwrap_or_default();
        if expected != received {
            return Err(BusError::ChainIdMismatch {
                received: received.to_string(),
                expected: expected.to_string(),
            });
        }
        Ok(())
    }
}
