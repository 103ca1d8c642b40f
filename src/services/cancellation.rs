//! Cooperative cancellation for in-flight worker sessions.
//!
//! The enclosing system keeps the [`CancellationHandle`]; the loop owns the
//! matching [`CancelSignal`] and races it against every poll and backoff sleep.

use std::sync::Arc;

use tokio::sync::watch;

/// Sender side: cancels every signal cloned from the same pair.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Receiver side, polled by the loop.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn cancellation_pair() -> (CancellationHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationHandle { tx: Arc::new(tx) },
        CancelSignal { rx },
    )
}

impl CancellationHandle {
    /// Cancel. Idempotent; a cancelled pair stays cancelled.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Pends forever if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
