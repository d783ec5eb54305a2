//! # Notice bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] used by the
//! gateway, propagator and reconciler to publish [`Notice`]s without blocking.
//!
//! ```text
//! Publishers (many):                 Listener (one):
//!   Gateway     ──┐
//!   Propagator  ──┼──► Bus ──► subscriber listener ──► SubscriberSet
//!   Reconciler  ──┘   (broadcast)   (in StateService)
//! ```
//!
//! ## Rules
//! - `publish()` never blocks; with no receivers the notice is discarded.
//! - One shared ring buffer; slow receivers observe `RecvError::Lagged(n)`.
//! - The bus stamps each notice with its own monotonically increasing sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::notice::Notice;

/// Broadcast channel for service notices. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Notice>,
    seq: Arc<AtomicU64>,
}

impl Bus {
    /// Creates a bus with the given ring capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Notice>(capacity.max(1));
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Stamps and publishes a notice to all current receivers.
    pub fn publish(&self, mut notice: Notice) {
        notice.seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(notice);
    }

    /// Creates an independent receiver for notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}
