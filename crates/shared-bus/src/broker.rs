//! # In-Process Broker
//!
//! A single task owns the subscription table. `subscribe`, `unsubscribe`,
//! `send` and friends post commands to it over a bounded queue, so callers
//! return as soon as the command is queued while fan-outs stay serialized:
//! the task finishes delivering one send before it looks at the next command.
//!
//! ## Subscription handles
//!
//! Subscriptions live in a dense arena. A removed slot goes to the back of a
//! FIFO free list and is handed out again before the arena grows, so handles
//! are recycled oldest-freed first.
//!
//! ## Delivery
//!
//! For every event, each subscription is visited in handle order:
//!
//! 1. Shutdown fired: the rest of the pass is abandoned.
//! 2. `Skipping`: nothing is delivered for this event.
//! 3. `Closed`: the subscription is removed once the pass is done.
//! 4. Required: `send().await`, blocking the broker until accepted.
//! 5. Optional: `try_send`; a full inbox silently drops the event.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bus_telemetry::{EVENTS_DROPPED, EVENTS_SENT, SUBSCRIBERS_ACTIVE};
use parking_lot::Mutex;
use shared_types::{BusError, BusResult, Event, ShutdownSignal};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::config::BrokerConfig;
use crate::subscriber::{accepts, Subscriber, SubscriberState};

/// Handle identifying a live subscription. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(usize);

impl SubscriptionId {
    fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    fn index(self) -> Option<usize> {
        self.0.checked_sub(1)
    }

    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription {
    subscriber: Arc<dyn Subscriber>,
    required: bool,
}

enum Command {
    Subscribe {
        subscriber: Arc<dyn Subscriber>,
        required: bool,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe(SubscriptionId),
    Publish(Vec<Arc<Event>>),
    Flush(oneshot::Sender<()>),
    Count(oneshot::Sender<usize>),
    Stop,
}

/// Client handle to the broker task.
pub struct Broker {
    commands: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    /// Spawn the broker task on the current runtime.
    ///
    /// The task exits when `shutdown` fires, on [`shutdown`](Self::shutdown),
    /// or once every `Broker` handle is dropped.
    #[must_use]
    pub fn new(config: &BrokerConfig, shutdown: ShutdownSignal) -> Self {
        let (commands, rx) = mpsc::channel(config.event_channel_buffer_size.max(1));
        let task = BrokerTask {
            commands: rx,
            registry: Registry::default(),
            shutdown,
        };
        let handle = tokio::spawn(task.run());
        Self {
            commands,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Register a subscriber.
    ///
    /// Required subscribers never miss an event; optional ones may when their
    /// inbox is full.
    pub async fn subscribe(
        &self,
        subscriber: Arc<dyn Subscriber>,
        required: bool,
    ) -> BusResult<SubscriptionId> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Subscribe {
            subscriber,
            required,
            reply,
        })
        .await?;
        rx.await.map_err(|_| BusError::Shutdown)
    }

    /// Remove a subscription. Unknown or already removed handles are ignored.
    pub async fn unsubscribe(&self, id: SubscriptionId) {
        let _ = self.post(Command::Unsubscribe(id)).await;
    }

    /// Queue one event for fan-out. Never reports delivery failures.
    pub async fn send(&self, event: Arc<Event>) {
        self.send_batch(vec![event]).await;
    }

    /// Queue a batch for fan-out as a single pass, in batch order.
    pub async fn send_batch(&self, events: Vec<Arc<Event>>) {
        if events.is_empty() {
            return;
        }
        if self.post(Command::Publish(events)).await.is_err() {
            trace!("Broker stopped, events discarded");
        }
    }

    /// Resolve once every command posted before this call has completed.
    pub async fn flush(&self) -> BusResult<()> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Flush(reply)).await?;
        rx.await.map_err(|_| BusError::Shutdown)
    }

    /// Number of live subscriptions.
    pub async fn subscriber_count(&self) -> BusResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.post(Command::Count(reply)).await?;
        rx.await.map_err(|_| BusError::Shutdown)
    }

    /// Stop the broker task after the commands already queued.
    pub async fn shutdown(&self) {
        let _ = self.post(Command::Stop).await;
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    async fn post(&self, command: Command) -> BusResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BusError::Shutdown)
    }
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

/// Dense subscription arena with FIFO slot recycling.
#[derive(Default)]
struct Registry {
    slots: Vec<Option<Subscription>>,
    free: VecDeque<usize>,
    active: usize,
}

impl Registry {
    fn insert(&mut self, subscription: Subscription) -> SubscriptionId {
        let index = match self.free.pop_front() {
            Some(index) => {
                self.slots[index] = Some(subscription);
                index
            }
            None => {
                self.slots.push(Some(subscription));
                self.slots.len() - 1
            }
        };
        self.active += 1;
        SubscriptionId::from_index(index)
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let Some(index) = id.index() else {
            return false;
        };
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(_) => {
                self.free.push_back(index);
                self.active -= 1;
                true
            }
            None => false,
        }
    }
}

struct BrokerTask {
    commands: mpsc::Receiver<Command>,
    registry: Registry,
    shutdown: ShutdownSignal,
}

impl BrokerTask {
    async fn run(mut self) {
        debug!("Broker started");
        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Subscribe {
                    subscriber,
                    required,
                    reply,
                } => {
                    let id = self.registry.insert(Subscription {
                        subscriber,
                        required,
                    });
                    SUBSCRIBERS_ACTIVE.inc();
                    debug!(handle = %id, required, "Subscriber added");
                    let _ = reply.send(id);
                }
                Command::Unsubscribe(id) => self.unsubscribe(id),
                Command::Publish(events) => {
                    for event in events {
                        if !self.fan_out(&event).await {
                            break;
                        }
                    }
                }
                Command::Flush(reply) => {
                    let _ = reply.send(());
                }
                Command::Count(reply) => {
                    let _ = reply.send(self.registry.active);
                }
                Command::Stop => break,
            }
        }
        SUBSCRIBERS_ACTIVE.sub(self.registry.active as i64);
        debug!("Broker stopped");
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        if self.registry.remove(id) {
            SUBSCRIBERS_ACTIVE.dec();
            debug!(handle = %id, "Subscriber removed");
        }
    }

    /// Deliver one event. Returns false when shutdown interrupted the pass.
    async fn fan_out(&mut self, event: &Arc<Event>) -> bool {
        EVENTS_SENT.inc();
        let Self {
            registry, shutdown, ..
        } = self;

        let mut closed = Vec::new();
        let mut completed = true;

        for (index, slot) in registry.slots.iter().enumerate() {
            if shutdown.is_triggered() {
                completed = false;
                break;
            }
            let Some(subscription) = slot else {
                continue;
            };
            let id = SubscriptionId::from_index(index);

            match subscription.subscriber.state() {
                SubscriberState::Skipping => continue,
                SubscriberState::Closed => {
                    closed.push(id);
                    continue;
                }
                SubscriberState::Open => {}
            }
            if !accepts(subscription.subscriber.types(), event.kind()) {
                continue;
            }

            let inbox = subscription.subscriber.inbox();
            if subscription.required {
                tokio::select! {
                    biased;
                    _ = shutdown.triggered() => {
                        completed = false;
                        break;
                    }
                    sent = inbox.send(Arc::clone(event)) => {
                        if sent.is_err() {
                            closed.push(id);
                        }
                    }
                }
            } else {
                match inbox.try_send(Arc::clone(event)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        EVENTS_DROPPED.inc();
                        trace!(handle = %id, event = %event.kind(), "Inbox full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(id),
                }
            }
        }

        for id in closed {
            self.unsubscribe(id);
        }
        completed
    }
}
