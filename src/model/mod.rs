//! Data model: identifiers and the records owned by the registries.
//!
//! - [`TaskRecord`] with its [`TaskState`] machine and failure taxonomy ([`ErrorType`]);
//! - [`ActorRecord`] with [`ActorState`];
//! - [`JobRecord`];
//! - id newtypes in [`ids`].

mod actor;
mod ids;
mod job;
mod task;

use std::time::{SystemTime, UNIX_EPOCH};

pub use actor::{ActorRecord, ActorState};
pub use ids::{ActorId, JobId, NodeId, ProducerId, TaskId, WorkerId};
pub use job::JobRecord;
pub use task::{ErrorInfo, ErrorType, LogLocations, LogStream, TaskRecord, TaskState, TaskType};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
        .unwrap_or_default()
}
