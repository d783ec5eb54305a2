//! Policies shared by producers.
//!
//! - [`BackoffPolicy`]: delay growth between failed flush attempts;
//! - [`Jitter`]: randomization to keep many producers from retrying in lockstep.

mod backoff;

pub use backoff::{BackoffPolicy, Jitter};
