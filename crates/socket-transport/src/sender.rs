//! # Socket Sender
//!
//! The publish side of the replication socket. Construction blocks until
//! the remote server is reachable, retrying on a fixed interval forever
//! (or until shutdown). A disabled sender is inert: `send` and `close` do
//! nothing, so callers never branch on the flag.

use bus_telemetry::{SOCKET_DIAL_FAILURES, SOCKET_MESSAGES_SENT};
use shared_types::{BusError, BusResult, ShutdownSignal};
use tracing::{debug, info, warn};

use crate::config::SocketConfig;
use crate::transport::PushSocket;

#[derive(Debug)]
pub struct SocketSender {
    push: Option<PushSocket>,
    endpoint: String,
}

impl SocketSender {
    /// Dial the configured server, or return an inert sender when disabled.
    ///
    /// Returns [`BusError::Shutdown`] if shutdown fires while still dialing.
    pub async fn connect(config: &SocketConfig, mut shutdown: ShutdownSignal) -> BusResult<Self> {
        let endpoint = config.endpoint();
        if !config.enabled {
            debug!("Socket sender disabled");
            return Ok(Self::disabled());
        }

        let mut attempt = 1u64;
        loop {
            match PushSocket::dial(config.transport, &endpoint, config.dial_timeout).await {
                Ok(push) => {
                    info!(
                        addr = %endpoint,
                        transport = %config.transport,
                        "Connected to socket server"
                    );
                    return Ok(Self {
                        push: Some(push),
                        endpoint,
                    });
                }
                Err(e) => {
                    SOCKET_DIAL_FAILURES.inc();
                    warn!(
                        addr = %endpoint,
                        attempt,
                        retry_in_ms = config.dial_retry_interval.as_millis() as u64,
                        error = %e,
                        "Failed to dial socket server, retrying"
                    );
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.triggered() => return Err(BusError::Shutdown),
                _ = tokio::time::sleep(config.dial_retry_interval) => {}
            }
            attempt += 1;
        }
    }

    /// Sender that accepts and discards everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            push: None,
            endpoint: String::new(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.push.is_some()
    }

    /// Forward one serialized event.
    pub async fn send(&mut self, payload: &[u8]) -> BusResult<()> {
        let Some(push) = self.push.as_mut() else {
            return Ok(());
        };
        push.send(payload).await?;
        SOCKET_MESSAGES_SENT.inc();
        Ok(())
    }

    /// Release the socket. Later sends are no-ops.
    pub async fn close(&mut self) {
        if let Some(push) = self.push.take() {
            push.close().await;
            debug!(addr = %self.endpoint, "Socket sender closed");
        }
    }
}
