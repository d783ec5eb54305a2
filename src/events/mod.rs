//! Events: producer-side task events and service-side notices.
//!
//! ## Contents
//! - [`TaskEvent`], [`StatusUpdate`], [`ProfileSpan`], [`EventBatch`]: what
//!   producers report;
//! - [`Notice`], [`NoticeKind`]: what the service announces after merging;
//! - [`Bus`]: thin wrapper over `tokio::sync::broadcast` carrying notices.
//!
//! ## Quick reference
//! - **Task event publishers**: [`Producer`](crate::Producer) via its buffer.
//! - **Notice publishers**: gateway, propagator, reconciler, subscriber workers.
//! - **Notice consumers**: the service's subscriber listener, which fans out to
//!   the [`SubscriberSet`](crate::SubscriberSet).

mod bus;
mod event;
mod notice;

pub use bus::Bus;
pub use event::{
    DropCounts, EventBatch, EventPayload, EventType, ProfileSpan, SequenceRange, StatusUpdate,
    TaskEvent,
};
pub use notice::{Notice, NoticeKind};
