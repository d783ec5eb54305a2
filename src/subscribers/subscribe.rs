//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for reacting to service [`Notice`]s
//! (alerting, audit trails, exporters). Each subscriber is driven by a dedicated
//! worker loop fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block ingestion nor other subscribers.
//! - Each subscriber declares its queue capacity via [`Subscribe::queue_capacity`].
//!   On overflow the notice is dropped for that subscriber and a
//!   `SubscriberOverflow` notice is published.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use tasklineage::{Notice, NoticeKind, Subscribe};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_notice(&self, notice: &Notice) {
//!         if notice.kind == NoticeKind::TaskFailed {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!     fn name(&self) -> &'static str { "failure-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Notice;

/// Contract for notice subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single notice.
    async fn on_notice(&self, notice: &Notice);

    /// Human-readable name (for logs and overflow notices).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
