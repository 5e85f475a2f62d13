//! # Dispatch Strategies
//!
//! ## Sequential
//!
//! One loop pushes each event to every interested writer before reading the
//! next one. All writers observe one global order.
//!
//! ## Concurrent
//!
//! One bounded queue and one worker per declared type, plus one for writers
//! that want everything. The main loop routes each event to its type's queue
//! and the catch-all queue; `TimeUpdate` goes to every queue. Within a queue
//! writers run in registration order; across queues there is no ordering.
//!
//! A writer registered for several types sits in several queues and gets
//! `TimeUpdate` from each of them, so every queue keeps the block boundary
//! in line with that type's events.

use std::sync::Arc;

use bus_telemetry::STORE_EVENTS_DISPATCHED;
use event_sources::SourceStreams;
use shared_types::{BusError, BusResult, Event, EventType, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, trace, warn};

use crate::chain::ChainCheck;
use crate::subscriber::StoreSubscriber;

/// A writer and its declared interest, fixed at registration.
#[derive(Clone)]
pub(crate) struct Registered {
    subscriber: Arc<dyn StoreSubscriber>,
    types: Vec<EventType>,
}

impl Registered {
    pub(crate) fn new(subscriber: Arc<dyn StoreSubscriber>) -> Self {
        let mut types = Vec::new();
        for kind in subscriber.types() {
            if !types.contains(&kind) {
                types.push(kind);
            }
        }
        Self { subscriber, types }
    }

    fn wants(&self, event: &Event) -> bool {
        event.is_time_update() || self.types.is_empty() || self.types.contains(&event.kind())
    }

    fn routes(&self) -> Vec<Route> {
        if self.types.is_empty() {
            vec![Route::All]
        } else {
            self.types.iter().copied().map(Route::Type).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Type(EventType),
    All,
}

impl Route {
    fn carries(self, event: &Event) -> bool {
        match self {
            Self::Type(kind) => event.is_time_update() || kind == event.kind(),
            Self::All => true,
        }
    }
}

struct Lane {
    route: Route,
    members: Vec<Arc<dyn StoreSubscriber>>,
}

/// Lanes in order of first declaration, members in registration order.
fn build_lanes(table: &[Registered]) -> Vec<Lane> {
    let mut lanes: Vec<Lane> = Vec::new();
    for entry in table {
        for route in entry.routes() {
            let member = Arc::clone(&entry.subscriber);
            match lanes.iter_mut().find(|lane| lane.route == route) {
                Some(lane) => lane.members.push(member),
                None => lanes.push(Lane {
                    route,
                    members: vec![member],
                }),
            }
        }
    }
    lanes
}

fn record(event: &Event) {
    STORE_EVENTS_DISPATCHED
        .with_label_values(&[event.kind().as_str()])
        .inc();
    trace!(id = %event.id(), kind = %event.kind(), "Event dispatched");
}

/// The source ran dry: report whatever error it left behind.
fn source_end(streams: &mut SourceStreams) -> BusResult<()> {
    match streams.take_error() {
        Some(e) => {
            warn!(error = %e, "Event source ended with error");
            Err(e)
        }
        None => {
            debug!("Event source exhausted");
            Ok(())
        }
    }
}

pub(crate) async fn run_sequential(
    table: &[Registered],
    streams: &mut SourceStreams,
    chain: &mut ChainCheck<'_>,
    mut shutdown: ShutdownSignal,
) -> BusResult<()> {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Ok(()),
            event = streams.events.recv() => event,
        };
        let Some(event) = event else {
            return source_end(streams);
        };
        chain.check(&event)?;

        let delivery = async {
            for entry in table.iter().filter(|entry| entry.wants(&event)) {
                entry.subscriber.push(Arc::clone(&event)).await?;
            }
            Ok::<_, BusError>(())
        };
        tokio::select! {
            biased;
            _ = shutdown.triggered() => return Ok(()),
            delivered = delivery => delivered?,
        }
        record(&event);
    }
}

pub(crate) async fn run_concurrent(
    table: &[Registered],
    buffer_size: usize,
    streams: &mut SourceStreams,
    chain: &mut ChainCheck<'_>,
    mut shutdown: ShutdownSignal,
) -> BusResult<()> {
    let mut workers = JoinSet::new();
    let mut queues = Vec::new();
    for lane in build_lanes(table) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        queues.push((lane.route, tx));
        workers.spawn(drain(lane, rx));
    }
    debug!(workers = queues.len(), "Dispatch workers started");

    let routed: BusResult<()> = 'route: loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                workers.abort_all();
                return Ok(());
            }
            Some(joined) = workers.join_next() => break 'route Err(worker_failure(joined)),
            event = streams.events.recv() => event,
        };
        let Some(event) = event else {
            break 'route Ok(());
        };
        if let Err(e) = chain.check(&event) {
            break 'route Err(e);
        }

        for (route, queue) in &queues {
            if !route.carries(&event) {
                continue;
            }
            let sent = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    workers.abort_all();
                    return Ok(());
                }
                sent = queue.send(Arc::clone(&event)) => sent,
            };
            // A closed queue means its worker failed; joining below reports why.
            if sent.is_err() {
                break 'route Ok(());
            }
        }
        record(&event);
    };

    if let Err(e) = routed {
        workers.abort_all();
        return Err(e);
    }

    drop(queues);
    let mut first_error = None;
    loop {
        let joined = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                workers.abort_all();
                return Ok(());
            }
            joined = workers.join_next() => joined,
        };
        let Some(joined) = joined else { break };
        if let Err(e) = joined.unwrap_or_else(|e| Err(join_error(e))) {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => source_end(streams),
    }
}

async fn drain(lane: Lane, mut queue: mpsc::Receiver<Arc<Event>>) -> BusResult<()> {
    while let Some(event) = queue.recv().await {
        for member in &lane.members {
            member.push(Arc::clone(&event)).await?;
        }
    }
    Ok(())
}

fn worker_failure(joined: Result<BusResult<()>, JoinError>) -> BusError {
    match joined {
        Ok(Err(e)) => e,
        Ok(Ok(())) => BusError::Store("dispatch worker stopped early".to_string()),
        Err(e) => join_error(e),
    }
}

fn join_error(e: JoinError) -> BusError {
    BusError::Store(format!("dispatch worker failed: {e}"))
}
