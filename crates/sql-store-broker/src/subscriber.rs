//! The storage writer port.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{BusResult, Event, EventType};

/// A component persisting events of the types it declares.
#[async_trait]
pub trait StoreSubscriber: Send + Sync {
    /// Declared interest. Empty means every type.
    ///
    /// Every writer also receives each `TimeUpdate`: once in sequential
    /// dispatch, once per declared type in concurrent dispatch.
    fn types(&self) -> Vec<EventType>;

    /// Persist one event. An error stops dispatch.
    async fn push(&self, event: Arc<Event>) -> BusResult<()>;
}
