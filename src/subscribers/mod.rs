//! # Notice subscribers.
//!
//! ```text
//! Gateway / Propagator / Reconciler ── publish(Notice) ──► Bus
//!                                                           │
//!                                         service listener ─┘
//!                                                │
//!                                       SubscriberSet::emit(&Notice)
//!                                    ┌───────────┼───────────┐
//!                                    ▼           ▼           ▼
//!                                LogWriter    Alerts      Custom ...
//! ```
//!
//! - [`Subscribe`]: the extension trait;
//! - [`SubscriberSet`]: bounded per-subscriber queues with panic isolation;
//! - [`LogWriter`] (feature `logging`): renders notices through `tracing`.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
