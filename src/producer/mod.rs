//! Producer side: buffering task events and delivering them to the service.
//!
//! ## Contents
//! - [`Producer`] and [`TaskSubmission`]: stamp and record task events;
//! - [`EventBuffer`]: bounded buffer with profile-first drop policy;
//! - [`EventSink`]: destination of batches (implemented by [`StateService`](crate::StateService));
//! - [`Reporter`]: periodic flush loop with backoff and a final flush on shutdown.
//!
//! ```text
//! Producer ── record ──► EventBuffer ── flush ──► Reporter ── send_batch ──► EventSink
//!                                           ▲                       │
//!                                           └──── requeue (retryable error)
//! ```

mod buffer;
mod handle;
mod reporter;
mod shutdown;
mod sink;

pub use buffer::{EventBuffer, Recorded};
pub use handle::{Producer, TaskSubmission};
pub use reporter::Reporter;
pub use shutdown::wait_for_shutdown_signal;
pub use sink::EventSink;
