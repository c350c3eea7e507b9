//! Shutdown coordination
//!
//! A single trigger fans out to every task that must stop: the
//! reconfiguration listener and the main task waiting to flush the audit
//! log. Triggering is idempotent and may happen from a signal handler
//! thread or the capture thread.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable shutdown trigger
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// A handle that completes once shutdown is requested
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Wait until shutdown is requested
    pub async fn wait(&self) {
        self.subscribe().recv().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`]
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Completes immediately if shutdown was already requested
    pub async fn recv(&mut self) {
        // The sender lives in `Shutdown`; an error means it was dropped,
        // which also ends the wait.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
