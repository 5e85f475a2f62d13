//! # Message Transport
//!
//! A push/pull pair that preserves message boundaries: one `send` on the
//! push side is one `recv` on the pull side.
//!
//! - **TCP**: each message is a `[u32 BE length][payload]` frame. The pull
//!   side accepts any number of pushers and interleaves their messages.
//! - **In-process**: messages move over a channel registered under the
//!   endpoint name. No bytes are framed.
//!
//! A frame whose length prefix exceeds the maximum is a protocol violation
//! and surfaces as [`FatalError::BadProtocol`].

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::framing::{read_frame, write_frame};
use shared_types::{BusError, BusResult, FatalError};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    InProc,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::InProc => f.write_str("inproc"),
        }
    }
}

type Inbound = mpsc::Sender<BusResult<Vec<u8>>>;

struct InprocEndpoint {
    binding: u64,
    inbound: Inbound,
}

static NEXT_BINDING: AtomicU64 = AtomicU64::new(1);

lazy_static! {
    /// Bound in-process endpoints.
    static ref INPROC_ENDPOINTS: Mutex<HashMap<String, InprocEndpoint>> =
        Mutex::new(HashMap::new());
}

/// Receiving end of the transport.
pub struct PullSocket {
    kind: TransportKind,
    local_addr: String,
    messages: mpsc::Receiver<BusResult<Vec<u8>>>,
    acceptor: Option<JoinHandle<()>>,
    /// Registry entry owned by this socket, in-process only.
    binding: Option<u64>,
}

impl PullSocket {
    /// Bind `endpoint`, buffering up to `buffer_size` unread messages.
    pub async fn bind(kind: TransportKind, endpoint: &str, buffer_size: usize) -> BusResult<Self> {
        let (tx, messages) = mpsc::channel(buffer_size.max(1));

        let (local_addr, acceptor, binding) = match kind {
            TransportKind::Tcp => {
                let listener = TcpListener::bind(endpoint).await?;
                let local_addr = listener.local_addr()?.to_string();
                (local_addr, Some(tokio::spawn(accept_loop(listener, tx))), None)
            }
            TransportKind::InProc => {
                let mut endpoints = INPROC_ENDPOINTS.lock();
                if endpoints
                    .get(endpoint)
                    .is_some_and(|bound| !bound.inbound.is_closed())
                {
                    return Err(BusError::Transport(format!(
                        "inproc endpoint already bound: {endpoint}"
                    )));
                }
                let binding = NEXT_BINDING.fetch_add(1, Ordering::Relaxed);
                endpoints.insert(
                    endpoint.to_string(),
                    InprocEndpoint {
                        binding,
                        inbound: tx,
                    },
                );
                (endpoint.to_string(), None, Some(binding))
            }
        };

        info!(transport = %kind, addr = %local_addr, "Socket bound");
        Ok(Self {
            kind,
            local_addr,
            messages,
            acceptor,
            binding,
        })
    }

    /// Next message from any connected peer.
    ///
    /// A fatal error means this socket must not be read again.
    pub async fn recv(&mut self) -> BusResult<Vec<u8>> {
        match self.messages.recv().await {
            Some(message) => message,
            None => Err(FatalError::SocketClosed.into()),
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Stop accepting and drop every connection.
    pub fn close(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        if let Some(binding) = self.binding.take() {
            let mut endpoints = INPROC_ENDPOINTS.lock();
            if endpoints
                .get(&self.local_addr)
                .is_some_and(|bound| bound.binding == binding)
            {
                endpoints.remove(&self.local_addr);
            }
        }
        self.messages.close();
        debug!(addr = %self.local_addr, "Socket closed");
    }
}

impl Drop for PullSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for PullSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullSocket")
            .field("kind", &self.kind)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

async fn accept_loop(listener: TcpListener, tx: Inbound) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Peer connected");
                    connections.spawn(read_connection(stream, peer, tx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    if tx.send(Err(e.into())).await.is_err() {
                        break;
                    }
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn read_connection(mut stream: TcpStream, peer: SocketAddr, tx: Inbound) {
    loop {
        let message = match read_frame(&mut stream).await {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => break,
            Err(BusError::FrameTooLarge { size, max }) => Err(FatalError::BadProtocol(format!(
                "frame of {size} bytes from {peer} exceeds {max}"
            ))
            .into()),
            Err(e) => {
                debug!(peer = %peer, error = %e, "Connection read failed");
                break;
            }
        };

        let fatal = message.is_err();
        if tx.send(message).await.is_err() || fatal {
            break;
        }
    }
    info!(peer = %peer, "Peer disconnected");
}

/// Sending end of the transport.
#[derive(Debug)]
pub enum PushSocket {
    Tcp(TcpStream),
    InProc(Inbound),
}

impl PushSocket {
    /// One connection attempt, bounded by `timeout`.
    pub async fn dial(kind: TransportKind, endpoint: &str, timeout: Duration) -> BusResult<Self> {
        match kind {
            TransportKind::Tcp => {
                let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
                    .await
                    .map_err(|_| BusError::Transport(format!("dial {endpoint} timed out")))??;
                stream.set_nodelay(true)?;
                Ok(Self::Tcp(stream))
            }
            TransportKind::InProc => INPROC_ENDPOINTS
                .lock()
                .get(endpoint)
                .filter(|bound| !bound.inbound.is_closed())
                .map(|bound| Self::InProc(bound.inbound.clone()))
                .ok_or_else(|| BusError::Transport(format!("no inproc endpoint: {endpoint}"))),
        }
    }

    /// Send one message.
    pub async fn send(&mut self, payload: &[u8]) -> BusResult<()> {
        match self {
            Self::Tcp(stream) => write_frame(stream, payload).await,
            Self::InProc(tx) => tx
                .send(Ok(payload.to_vec()))
                .await
                .map_err(|_| BusError::Transport("inproc peer closed".to_string())),
        }
    }

    pub async fn close(self) {
        if let Self::Tcp(mut stream) = self {
            let _ = stream.shutdown().await;
        }
    }
}
