//! Multi-producer callback queue.

use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use tokio::sync::{
    Mutex,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::debug;

use super::Callback;

/// FIFO of decoded items waiting for dispatch.
///
/// Any number of producers may [`post`](Self::post); pops are serialised
/// so items leave in arrival order. The queue holds its own sender, so a
/// pop only ever ends by receiving an item or timing out.
pub struct CallbackQueue {
    tx: UnboundedSender<Callback>,
    rx: Mutex<UnboundedReceiver<Callback>>,
    pending: AtomicUsize,
}

impl Default for CallbackQueue {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl CallbackQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Append an item.
    pub fn post(&self, callback: impl Into<Callback>) {
        let callback = callback.into();
        let kind = callback.kind();
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(callback).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            debug!(?kind, "callback queue receiver dropped; item discarded");
        }
    }

    /// Pop an item without waiting.
    ///
    /// Returns `None` when the queue is empty or another consumer is
    /// currently waiting on it.
    #[must_use]
    pub fn try_pop(&self) -> Option<Callback> {
        let item = self.rx.try_lock().ok()?.try_recv().ok()?;
        Some(self.taken(item))
    }

    /// Wait until an item is available.
    pub async fn pop(&self) -> Option<Callback> {
        let item = self.rx.lock().await.recv().await?;
        Some(self.taken(item))
    }

    /// Wait up to `timeout` for an item.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Callback> {
        tokio::time::timeout(timeout, self.pop()).await.ok().flatten()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize { self.pending.load(Ordering::Acquire) }

    /// Returns `true` when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn taken(&self, item: Callback) -> Callback {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        item
    }
}
