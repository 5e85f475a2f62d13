//! # Socket Client
//!
//! Queued publishing over a [`SocketSender`]. Producers enqueue serialized
//! events; a single writer task drains the queue onto the socket in order.
//!
//! Enqueueing waits at most `socket_queue_timeout`. An event that times out
//! is dropped with a warning; after `max_send_timeouts` timeouts in a row the
//! client reports [`FatalError::SenderStuck`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared_types::{BusResult, Event, FatalError, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::SocketConfig;
use crate::sender::SocketSender;

#[derive(Debug)]
pub struct SocketClient {
    queue: Option<mpsc::Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    queue_timeout: Duration,
    max_send_timeouts: u32,
    consecutive_timeouts: AtomicU32,
}

impl SocketClient {
    /// Connect (see [`SocketSender::connect`]) and start the writer task.
    pub async fn connect(config: &SocketConfig, shutdown: ShutdownSignal) -> BusResult<Self> {
        let mut client = Self {
            queue: None,
            writer: None,
            queue_timeout: config.socket_queue_timeout,
            max_send_timeouts: config.max_send_timeouts,
            consecutive_timeouts: AtomicU32::new(0),
        };
        if !config.enabled {
            return Ok(client);
        }

        let sender = SocketSender::connect(config, shutdown.clone()).await?;
        let (queue, rx) = mpsc::channel(config.event_channel_buffer_size.max(1));
        client.queue = Some(queue);
        client.writer = Some(tokio::spawn(write_loop(sender, rx, shutdown)));
        Ok(client)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    pub async fn send(&self, event: &Event) -> BusResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.enqueue(event.encode()?).await
    }

    /// Enqueue a batch in order, stopping at the first fatal error.
    pub async fn send_batch(&self, events: &[Arc<Event>]) -> BusResult<()> {
        for event in events {
            self.send(event).await?;
        }
        Ok(())
    }

    async fn enqueue(&self, bytes: Vec<u8>) -> BusResult<()> {
        let Some(queue) = &self.queue else {
            return Ok(());
        };

        match tokio::time::timeout(self.queue_timeout, queue.send(bytes)).await {
            Ok(Ok(())) => {
                self.consecutive_timeouts.store(0, Ordering::Relaxed);
                Ok(())
            }
            Ok(Err(_)) => Err(FatalError::SocketClosed.into()),
            Err(_) => {
                let timeouts = self.consecutive_timeouts.fetch_add(1, Ordering::Relaxed) + 1;
                if timeouts >= self.max_send_timeouts {
                    error!(timeouts, "Socket client stuck, giving up");
                    return Err(FatalError::SenderStuck { timeouts }.into());
                }
                warn!(
                    timeouts,
                    max = self.max_send_timeouts,
                    "Socket queue full, event dropped"
                );
                Ok(())
            }
        }
    }

    /// Drain whatever is queued, then close the socket.
    pub async fn close(mut self) {
        self.queue = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
    }
}

async fn write_loop(
    mut sender: SocketSender,
    mut queue: mpsc::Receiver<Vec<u8>>,
    mut shutdown: ShutdownSignal,
) {
    loop {
        let bytes = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            bytes = queue.recv() => match bytes {
                Some(bytes) => bytes,
                None => break,
            },
        };
        if let Err(e) = sender.send(&bytes).await {
            error!(error = %e, "Socket write failed, stopping writer");
            break;
        }
    }
    sender.close().await;
    debug!("Socket client writer stopped");
}
