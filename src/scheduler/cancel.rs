//! Cooperative run cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancel flag.
///
/// The scheduler checks it at every chunk boundary and before each item
/// dispatch. Calls already in flight are left to finish.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation of the current run.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Clear the flag before a new run.
    pub(crate) fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
