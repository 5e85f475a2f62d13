//! # Broker Subscribers
//!
//! The consuming side of the in-process broker.
//!
//! A subscriber exposes a tagged [`SubscriberState`] and a bounded inbox.
//! The broker reads the state once per event:
//!
//! - `Open`: deliver (blocking for required subscriptions, best-effort otherwise)
//! - `Skipping`: bypass for this event only
//! - `Closed`: remove the subscription after the current pass

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use shared_types::{Event, EventType};
use tokio::sync::mpsc;

/// Delivery state reported by a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriberState {
    Open = 0,
    Skipping = 1,
    Closed = 2,
}

impl SubscriberState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Skipping,
            _ => Self::Closed,
        }
    }
}

/// Anything that can be registered with the [`Broker`](crate::Broker).
pub trait Subscriber: Send + Sync {
    /// Current delivery state.
    fn state(&self) -> SubscriberState;

    /// Event types of interest. Empty means every type.
    fn types(&self) -> &[EventType] {
        &[]
    }

    /// Bounded inbox the broker pushes into.
    fn inbox(&self) -> &mpsc::Sender<Arc<Event>>;
}

/// Whether a subscriber declaring `types` should see an event of `kind`.
///
/// `TimeUpdate` marks block boundaries and reaches everyone.
#[must_use]
pub fn accepts(types: &[EventType], kind: EventType) -> bool {
    kind.is_time_update() || types.is_empty() || types.contains(&kind)
}

/// Subscriber backed by a tokio mpsc channel.
///
/// The receiving half is handed back to the caller on construction.
#[derive(Debug)]
pub struct ChannelSubscriber {
    state: AtomicU8,
    types: Vec<EventType>,
    inbox: mpsc::Sender<Arc<Event>>,
}

impl ChannelSubscriber {
    /// Subscriber for every event type.
    #[must_use]
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<Event>>) {
        Self::with_types(capacity, Vec::new())
    }

    /// Subscriber for the given event types (plus `TimeUpdate`).
    #[must_use]
    pub fn with_types(
        capacity: usize,
        types: Vec<EventType>,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let subscriber = Arc::new(Self {
            state: AtomicU8::new(SubscriberState::Open as u8),
            types,
            inbox: tx,
        });
        (subscriber, rx)
    }

    /// Bypass events until [`resume`](Self::resume) is called.
    pub fn skip(&self) {
        self.transition(SubscriberState::Skipping);
    }

    pub fn resume(&self) {
        self.transition(SubscriberState::Open);
    }

    /// Ask the broker to drop this subscription. Terminal.
    pub fn close(&self) {
        self.state
            .store(SubscriberState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, next: SubscriberState) {
        // Closed is terminal.
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != SubscriberState::Closed as u8).then_some(next as u8)
            });
    }
}

impl Subscriber for ChannelSubscriber {
    fn state(&self) -> SubscriberState {
        SubscriberState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn types(&self) -> &[EventType] {
        &self.types
    }

    fn inbox(&self) -> &mpsc::Sender<Arc<Event>> {
        &self.inbox
    }
}
