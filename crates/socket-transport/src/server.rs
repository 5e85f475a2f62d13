//! # Socket Server
//!
//! The remote receive side: an [`EventSource`] fed by a [`PullSocket`].
//!
//! ## Receive loop
//!
//! - Each message is decoded into an [`Event`] and pushed to a bounded channel.
//! - A message that does not decode is logged and skipped.
//! - A fatal transport error (bad protocol, socket closed) is logged, put on
//!   the error channel, and ends the loop. Nothing more is read.
//! - Any other receive error is logged and the loop continues.
//! - Shutdown closes the socket and the event channel.

use std::sync::Arc;

use async_trait::async_trait;
use bus_telemetry::SOCKET_MESSAGES_RECEIVED;
use event_sources::{EventSource, SourceStreams};
use parking_lot::Mutex;
use shared_types::{BusError, BusResult, Event, ShutdownSignal};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::SocketConfig;
use crate::transport::PullSocket;

enum ServerState {
    Idle,
    Listening(PullSocket),
    Receiving,
}

pub struct SocketServer {
    config: SocketConfig,
    state: tokio::sync::Mutex<ServerState>,
    local_addr: Mutex<Option<String>>,
}

impl SocketServer {
    #[must_use]
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            state: tokio::sync::Mutex::new(ServerState::Idle),
            local_addr: Mutex::new(None),
        }
    }

    /// Bound address once listening; resolves port 0 for TCP.
    #[must_use]
    pub fn local_addr(&self) -> Option<String> {
        self.local_addr.lock().clone()
    }

    async fn bind(&self) -> BusResult<PullSocket> {
        let socket = PullSocket::bind(
            self.config.transport,
            &self.config.endpoint(),
            self.config.socket_channel_buffer_size,
        )
        .await?;
        *self.local_addr.lock() = Some(socket.local_addr().to_string());
        Ok(socket)
    }
}

#[async_trait]
impl EventSource for SocketServer {
    async fn listen(&self) -> BusResult<()> {
        let mut state = self.state.lock().await;
        if matches!(*state, ServerState::Idle) {
            *state = ServerState::Listening(self.bind().await?);
        }
        Ok(())
    }

    async fn receive(&self, shutdown: ShutdownSignal) -> BusResult<SourceStreams> {
        let socket = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, ServerState::Receiving) {
                ServerState::Listening(socket) => socket,
                ServerState::Idle => match self.bind().await {
                    Ok(socket) => socket,
                    Err(e) => {
                        *state = ServerState::Idle;
                        return Err(e);
                    }
                },
                ServerState::Receiving => {
                    return Err(BusError::Transport(
                        "socket server is already receiving".to_string(),
                    ))
                }
            }
        };

        let (streams, events_tx, errors_tx) =
            SourceStreams::channel(self.config.socket_channel_buffer_size);
        tokio::spawn(receive_loop(socket, events_tx, errors_tx, shutdown));
        Ok(streams)
    }
}

async fn receive_loop(
    mut socket: PullSocket,
    events: mpsc::Sender<Arc<Event>>,
    errors: mpsc::Sender<BusError>,
    mut shutdown: ShutdownSignal,
) {
    info!(addr = %socket.local_addr(), "Socket server receiving");
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            message = socket.recv() => message,
        };

        let bytes = match message {
            Ok(bytes) => bytes,
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Socket receive failed, no further events will be read");
                let _ = errors.try_send(e);
                break;
            }
            Err(e) => {
                warn!(error = %e, "Socket receive error, retrying");
                continue;
            }
        };
        SOCKET_MESSAGES_RECEIVED.inc();

        let event = match Event::decode(&bytes) {
            Ok(event) => Arc::new(event),
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "Dropping undecodable message");
                continue;
            }
        };
        trace!(id = %event.id(), kind = %event.kind(), "Event received");

        tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            sent = events.send(event) => {
                if sent.is_err() {
                    debug!("Socket server consumer dropped");
                    break;
                }
            }
        }
    }
    socket.close();
    info!(addr = %socket.local_addr(), "Socket server stopped");
}
