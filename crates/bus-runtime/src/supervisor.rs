//! # Supervisor
//!
//! Owns the process-wide shutdown signal. Components report their results
//! here; the first fatal error is recorded and shuts everything down.

use parking_lot::Mutex;
use shared_types::{shutdown_channel, BusResult, FatalError, ShutdownSignal, ShutdownTrigger};
use tracing::{error, info};

pub struct Supervisor {
    trigger: ShutdownTrigger,
    fatal: Mutex<Option<FatalError>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        let (trigger, _) = shutdown_channel();
        Self {
            trigger,
            fatal: Mutex::new(None),
        }
    }

    /// Signal handed to every long-running task.
    #[must_use]
    pub fn signal(&self) -> ShutdownSignal {
        self.trigger.signal()
    }

    /// Inspect a component result. Returns true if it was fatal.
    pub fn observe<T>(&self, result: &BusResult<T>) -> bool {
        let Some(fatal) = result.as_ref().err().and_then(|e| e.as_fatal()) else {
            return false;
        };

        let first = {
            let mut recorded = self.fatal.lock();
            let first = recorded.is_none();
            recorded.get_or_insert_with(|| fatal.clone());
            first
        };
        if first {
            error!(error = %fatal, "Fatal bus error, shutting down");
        }
        self.trigger.trigger();
        true
    }

    /// Operator stop.
    pub fn shutdown(&self) {
        if !self.trigger.is_triggered() {
            info!("Shutdown requested");
        }
        self.trigger.trigger();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.trigger.is_triggered()
    }

    /// The first fatal error observed, if shutdown was caused by one.
    #[must_use]
    pub fn fatal_error(&self) -> Option<FatalError> {
        self.fatal.lock().clone()
    }
}
