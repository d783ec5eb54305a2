//! # Task events emitted by producers.
//!
//! A [`TaskEvent`] is one fact about one task attempt, reported by a producer
//! (worker or driver process). Two classes exist:
//! - **status events** ([`StatusUpdate`]): state transitions plus identity metadata;
//! - **profiling events** ([`ProfileSpan`]): timing spans, least valuable and
//!   the first to be dropped under pressure.
//!
//! Events are shipped in an [`EventBatch`] together with the producer's
//! sequence range and the drop counts accumulated since the previous flush.
//!
//! ## Ordering guarantees
//! Each producer stamps its events with a monotonically increasing `seq`.
//! Ordering is only meaningful per producer; nothing is assumed across producers.
//!
//! ## Example
//! ```rust
//! use tasklineage::{JobId, StatusUpdate, TaskEvent, TaskId, TaskState, TaskType};
//!
//! let id = TaskId::new();
//! let ev = TaskEvent::status(
//!     id,
//!     7,
//!     1_000,
//!     StatusUpdate::new(TaskState::Pending)
//!         .with_name("f")
//!         .with_task_type(TaskType::NormalTask)
//!         .with_job(JobId::new()),
//! );
//! assert_eq!(ev.task_id, id);
//! assert!(ev.is_status());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{
    ActorId, ErrorInfo, JobId, NodeId, ProducerId, TaskId, TaskState, TaskType, WorkerId,
};

/// Class of a task event (also the label of the drop counter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StatusEvent,
    ProfileEvent,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::StatusEvent => "STATUS_EVENT",
            EventType::ProfileEvent => "PROFILE_EVENT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial view of a task carried by a status event.
///
/// Every field is optional: the registry fills in what is missing and never
/// overwrites identity fields that are already known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: Option<TaskState>,
    pub name: Option<String>,
    pub task_type: Option<TaskType>,
    pub parent_task_id: Option<TaskId>,
    pub logical_task_id: Option<TaskId>,
    pub job_id: Option<JobId>,
    pub actor_id: Option<ActorId>,
    /// Class name of the actor created by an `ACTOR_CREATION_TASK`.
    pub actor_class_name: Option<String>,
    pub worker_id: Option<WorkerId>,
    pub node_id: Option<NodeId>,
    pub attempt_number: Option<u32>,
    /// Only meaningful together with `state = FAILED`.
    pub error: Option<ErrorInfo>,
}

impl StatusUpdate {
    /// Creates an update reporting `state`.
    pub fn new(state: TaskState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Creates a metadata-only update.
    pub fn metadata() -> Self {
        Self::default()
    }

    /// Creates a `FAILED` update with the given error.
    pub fn failed(error: ErrorInfo) -> Self {
        Self {
            state: Some(TaskState::Failed),
            error: Some(error),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[inline]
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    #[inline]
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_task_id = Some(parent);
        self
    }

    #[inline]
    pub fn with_logical_task(mut self, logical: TaskId) -> Self {
        self.logical_task_id = Some(logical);
        self
    }

    #[inline]
    pub fn with_job(mut self, job: JobId) -> Self {
        self.job_id = Some(job);
        self
    }

    #[inline]
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor_id = Some(actor);
        self
    }

    #[inline]
    pub fn with_actor_class(mut self, class_name: impl Into<String>) -> Self {
        self.actor_class_name = Some(class_name.into());
        self
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker_id = Some(worker);
        self
    }

    #[inline]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node_id = Some(node);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt_number = Some(attempt);
        self
    }
}

/// Timing span recorded while a task runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSpan {
    /// Emitting component (e.g. `"worker"`).
    pub component: String,
    /// Span name (e.g. `"task:execute"`).
    pub event_name: String,
    pub start_ms: u64,
    pub end_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ProfileSpan {
    pub fn new(
        component: impl Into<String>,
        event_name: impl Into<String>,
        start_ms: u64,
        end_ms: u64,
    ) -> Self {
        Self {
            component: component.into(),
            event_name: event_name.into(),
            start_ms,
            end_ms,
            extra: None,
        }
    }

    #[inline]
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Payload of a task event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Status(StatusUpdate),
    Profile(ProfileSpan),
}

/// One fact about one task attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: TaskId,
    /// Producer-local, monotonically increasing sequence number.
    pub seq: u64,
    /// Producer wall-clock time in milliseconds since the epoch.
    pub at_ms: u64,
    pub payload: EventPayload,
}

impl TaskEvent {
    pub fn status(task_id: TaskId, seq: u64, at_ms: u64, update: StatusUpdate) -> Self {
        Self {
            task_id,
            seq,
            at_ms,
            payload: EventPayload::Status(update),
        }
    }

    pub fn profile(task_id: TaskId, seq: u64, span: ProfileSpan) -> Self {
        Self {
            task_id,
            seq,
            at_ms: span.end_ms,
            payload: EventPayload::Profile(span),
        }
    }

    #[inline]
    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Status(_) => EventType::StatusEvent,
            EventPayload::Profile(_) => EventType::ProfileEvent,
        }
    }

    #[inline]
    pub fn is_status(&self) -> bool {
        matches!(self.payload, EventPayload::Status(_))
    }
}

/// Drop counts accumulated by a producer between two flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
    pub status: u64,
    pub profile: u64,
}

impl DropCounts {
    #[inline]
    pub fn get(&self, ty: EventType) -> u64 {
        match ty {
            EventType::StatusEvent => self.status,
            EventType::ProfileEvent => self.profile,
        }
    }

    #[inline]
    pub(crate) fn bump(&mut self, ty: EventType) {
        match ty {
            EventType::StatusEvent => self.status += 1,
            EventType::ProfileEvent => self.profile += 1,
        }
    }

    #[inline]
    pub(crate) fn absorb(&mut self, other: DropCounts) {
        self.status += other.status;
        self.profile += other.profile;
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.status == 0 && self.profile == 0
    }
}

/// Inclusive range of sequence numbers covered by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRange {
    pub first: u64,
    pub last: u64,
}

impl SequenceRange {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    #[inline]
    pub fn contains(&self, seq: u64) -> bool {
        (self.first..=self.last).contains(&seq)
    }
}

/// A flush from one producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub producer_id: ProducerId,
    /// `None` only for batches that carry no events (drop counts only).
    pub range: Option<SequenceRange>,
    pub events: Vec<TaskEvent>,
    pub dropped: DropCounts,
}

impl EventBatch {
    /// Builds a batch, deriving the range from the events.
    pub fn from_events(producer_id: ProducerId, events: Vec<TaskEvent>) -> Self {
        let range = events
            .iter()
            .map(|e| e.seq)
            .min()
            .zip(events.iter().map(|e| e.seq).max())
            .map(|(first, last)| SequenceRange::new(first, last));
        Self {
            producer_id,
            range,
            events,
            dropped: DropCounts::default(),
        }
    }

    #[inline]
    pub fn with_dropped(mut self, dropped: DropCounts) -> Self {
        self.dropped = dropped;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_range_spans_min_and_max_seq() {
        let id = TaskId::new();
        let events = vec![
            TaskEvent::status(id, 5, 0, StatusUpdate::new(TaskState::Running)),
            TaskEvent::status(id, 3, 0, StatusUpdate::new(TaskState::Pending)),
            TaskEvent::profile(id, 9, ProfileSpan::new("worker", "exec", 1, 2)),
        ];
        let batch = EventBatch::from_events(ProducerId::new(), events);
        assert_eq!(batch.range, Some(SequenceRange::new(3, 9)));
    }

    #[test]
    fn empty_batch_has_no_range() {
        let batch = EventBatch::from_events(ProducerId::new(), Vec::new());
        assert!(batch.range.is_none());
        assert!(batch.is_empty());
    }

    #[test]
    fn drop_counts_are_keyed_by_type() {
        let mut d = DropCounts::default();
        d.bump(EventType::ProfileEvent);
        d.bump(EventType::ProfileEvent);
        d.bump(EventType::StatusEvent);
        assert_eq!(d.get(EventType::ProfileEvent), 2);
        assert_eq!(d.get(EventType::StatusEvent), 1);
    }
}
