//! # Shutdown Signal
//!
//! Process-wide cancellation shared by every long-running bus task, built on
//! a `tokio::sync::watch` channel the same way the node runtime broadcasts
//! shutdown to its handlers.

use lazy_static::lazy_static;
use tokio::sync::watch;

lazy_static! {
    /// Shared by every [`ShutdownSignal::never`]; nothing ever sends on it.
    static ref NEVER: watch::Sender<bool> = watch::channel(false).0;
}

/// Create a connected trigger/signal pair.
#[must_use]
pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

/// Sending half. Dropping it does NOT signal shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Another receiving half for this trigger.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Receiving half, cheap to clone into every task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// A signal that never fires, for components run without supervision.
    #[must_use]
    pub fn never() -> Self {
        Self {
            rx: NEVER.subscribe(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been triggered.
    ///
    /// If the trigger is dropped without firing, this never resolves.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
