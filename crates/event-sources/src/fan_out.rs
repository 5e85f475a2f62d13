//! # Fan-Out Event Source
//!
//! Replicates one upstream [`EventSource`] to a fixed number of consumers.
//!
//! ## Gating
//!
//! Each `receive` registers one consumer. Forwarding starts only once the
//! declared number of consumers has registered, so none of them misses the
//! head of the stream. Registering one more than declared is fatal.
//!
//! ## Delivery
//!
//! Every event goes to every consumer with a blocking send, in registration
//! order. A slow consumer therefore stalls all the others.
//!
//! When the upstream stream ends, a pending upstream error (if any) is
//! copied to every consumer's error channel, then all channels close.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{BusError, BusResult, Event, FatalError, ShutdownSignal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::source::{EventSource, SourceStreams};

/// Sending halves of one registered consumer.
struct Output {
    events: mpsc::Sender<Arc<Event>>,
    errors: mpsc::Sender<BusError>,
}

#[derive(Default)]
struct Registrations {
    count: usize,
    pending: Vec<Output>,
}

pub struct FanOutEventSource {
    upstream: Arc<dyn EventSource>,
    expected_subscribers: usize,
    buffer_size: usize,
    registrations: Mutex<Registrations>,
    listened: tokio::sync::Mutex<bool>,
}

impl FanOutEventSource {
    #[must_use]
    pub fn new(
        upstream: Arc<dyn EventSource>,
        expected_subscribers: usize,
        buffer_size: usize,
    ) -> Self {
        Self {
            upstream,
            expected_subscribers,
            buffer_size,
            registrations: Mutex::new(Registrations::default()),
            listened: tokio::sync::Mutex::new(false),
        }
    }

    #[must_use]
    pub fn expected_subscribers(&self) -> usize {
        self.expected_subscribers
    }

    /// Register a consumer; returns every output once the last one is in.
    fn register(&self, output: Output) -> BusResult<Option<Vec<Output>>> {
        let mut registrations = self.registrations.lock();
        if registrations.count >= self.expected_subscribers {
            error!(
                expected = self.expected_subscribers,
                "Fan-out source received more subscribers than declared"
            );
            return Err(FatalError::TooManySubscribers {
                expected: self.expected_subscribers,
            }
            .into());
        }

        registrations.count += 1;
        registrations.pending.push(output);
        debug!(
            registered = registrations.count,
            expected = self.expected_subscribers,
            "Fan-out subscriber registered"
        );

        if registrations.count == self.expected_subscribers {
            Ok(Some(std::mem::take(&mut registrations.pending)))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl EventSource for FanOutEventSource {
    async fn listen(&self) -> BusResult<()> {
        let mut listened = self.listened.lock().await;
        if !*listened {
            self.upstream.listen().await?;
            *listened = true;
        }
        Ok(())
    }

    async fn receive(&self, shutdown: ShutdownSignal) -> BusResult<SourceStreams> {
        let (streams, events, errors) = SourceStreams::channel(self.buffer_size);

        let Some(outputs) = self.register(Output { events, errors })? else {
            return Ok(streams);
        };

        match self.upstream.receive(shutdown.clone()).await {
            Ok(upstream) => {
                info!(
                    subscribers = outputs.len(),
                    "All fan-out subscribers registered, forwarding"
                );
                tokio::spawn(forward(upstream, outputs, shutdown));
            }
            Err(e) => {
                error!(error = %e, "Fan-out upstream failed to start");
                for output in &outputs {
                    let _ = output.errors.try_send(e.clone());
                }
            }
        }
        Ok(streams)
    }
}

async fn forward(mut upstream: SourceStreams, outputs: Vec<Output>, mut shutdown: ShutdownSignal) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.triggered() => return,
            event = upstream.events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        for (index, output) in outputs.iter().enumerate() {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => return,
                sent = output.events.send(Arc::clone(&event)) => {
                    if sent.is_err() {
                        trace!(subscriber = index, "Fan-out subscriber gone");
                    }
                }
            }
        }
    }

    // Error first so a consumer that sees its events end finds it waiting.
    if let Some(e) = upstream.take_error() {
        debug!(error = %e, "Forwarding upstream error to fan-out subscribers");
        for output in &outputs {
            let _ = output.errors.try_send(e.clone());
        }
    }
    debug!("Fan-out upstream exhausted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{shutdown_channel, EventType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    /// Upstream whose streams are fed by the test.
    struct ScriptedSource {
        listens: AtomicUsize,
        receives: AtomicUsize,
        streams: Mutex<Option<SourceStreams>>,
    }

    impl ScriptedSource {
        fn new() -> (Arc<Self>, mpsc::Sender<Arc<Event>>, mpsc::Sender<BusError>) {
            let (streams, events, errors) = SourceStreams::channel(16);
            let source = Arc::new(Self {
                listens: AtomicUsize::new(0),
                receives: AtomicUsize::new(0),
                streams: Mutex::new(Some(streams)),
            });
            (source, events, errors)
        }
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        async fn listen(&self) -> BusResult<()> {
            self.listens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn receive(&self, _shutdown: ShutdownSignal) -> BusResult<SourceStreams> {
            self.receives.fetch_add(1, Ordering::SeqCst);
            self.streams
                .lock()
                .take()
                .ok_or_else(|| BusError::Transport("already received".into()))
        }
    }

    fn event(block: &str) -> Arc<Event> {
        Arc::new(Event::new(EventType::Order, block, Vec::new()))
    }

    #[tokio::test]
    async fn test_forwarding_waits_for_all_subscribers() {
        let (upstream, events, _errors) = ScriptedSource::new();
        let fan_out = FanOutEventSource::new(upstream.clone(), 2, 8);

        let mut first = fan_out.receive(ShutdownSignal::never()).await.unwrap();
        events.send(event("b1")).await.unwrap();
        assert_eq!(upstream.receives.load(Ordering::SeqCst), 0);
        assert!(timeout(Duration::from_millis(50), first.events.recv())
            .await
            .is_err());

        let mut second = fan_out.receive(ShutdownSignal::never()).await.unwrap();
        assert_eq!(upstream.receives.load(Ordering::SeqCst), 1);
        events.send(event("b2")).await.unwrap();

        for streams in [&mut first, &mut second] {
            for expected in ["b1", "b2"] {
                let got = timeout(Duration::from_secs(1), streams.events.recv())
                    .await
                    .expect("timeout")
                    .expect("event");
                assert_eq!(got.trace_id(), expected);
            }
        }
    }

    #[tokio::test]
    async fn test_extra_subscriber_is_fatal() {
        let (upstream, _events, _errors) = ScriptedSource::new();
        let fan_out = FanOutEventSource::new(upstream, 2, 8);

        let _a = fan_out.receive(ShutdownSignal::never()).await.unwrap();
        let _b = fan_out.receive(ShutdownSignal::never()).await.unwrap();
        let err = fan_out.receive(ShutdownSignal::never()).await.unwrap_err();
        assert_eq!(
            err,
            BusError::Fatal(FatalError::TooManySubscribers { expected: 2 })
        );
    }

    #[tokio::test]
    async fn test_upstream_error_reaches_every_subscriber_once() {
        let (upstream, events, errors) = ScriptedSource::new();
        let fan_out = FanOutEventSource::new(upstream, 2, 8);
        let mut a = fan_out.receive(ShutdownSignal::never()).await.unwrap();
        let mut b = fan_out.receive(ShutdownSignal::never()).await.unwrap();

        events.send(event("b1")).await.unwrap();
        errors.try_send(BusError::Io("disk".into())).unwrap();
        drop(events);
        drop(errors);

        for streams in [&mut a, &mut b] {
            let drained = timeout(Duration::from_secs(1), async {
                let mut n = 0;
                while streams.events.recv().await.is_some() {
                    n += 1;
                }
                n
            })
            .await
            .expect("timeout");
            assert_eq!(drained, 1);
            assert_eq!(streams.take_error(), Some(BusError::Io("disk".into())));
            assert!(timeout(Duration::from_secs(1), streams.errors.recv())
                .await
                .expect("timeout")
                .is_none());
        }
    }

    #[tokio::test]
    async fn test_listen_forwards_once() {
        let (upstream, _events, _errors) = ScriptedSource::new();
        let fan_out = FanOutEventSource::new(upstream.clone(), 1, 8);

        fan_out.listen().await.unwrap();
        fan_out.listen().await.unwrap();
        fan_out.listen().await.unwrap();
        assert_eq!(upstream.listens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_outputs() {
        let (upstream, _events, _errors) = ScriptedSource::new();
        let fan_out = FanOutEventSource::new(upstream, 1, 8);
        let (trigger, signal) = shutdown_channel();
        let mut only = fan_out.receive(signal).await.unwrap();

        trigger.trigger();
        let next = timeout(Duration::from_secs(1), only.events.recv())
            .await
            .expect("timeout");
        assert!(next.is_none());
    }
}
