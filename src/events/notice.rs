//! # Service notices broadcast to subscribers.
//!
//! The [`NoticeKind`] enum classifies what the service observed or derived:
//! - **Ingestion**: batches merged or rejected, producer-side drops;
//! - **Failures**: tasks failed directly, cascades through descendants;
//! - **Death signals**: workers, nodes, actors, jobs;
//! - **Reconciliation**: deferred job sweeps fired or cancelled;
//! - **Subscriber health**: overflow and panics inside subscribers.
//!
//! A [`Notice`] carries optional metadata depending on its kind. The sequence
//! number is assigned by the [`Bus`](super::Bus) when the notice is published.
//!
//! ## Example
//! ```rust
//! use tasklineage::{Notice, NoticeKind, TaskId};
//!
//! let id = TaskId::new();
//! let n = Notice::new(NoticeKind::TaskFailed)
//!     .with_task(id)
//!     .with_reason("boom");
//!
//! assert_eq!(n.kind, NoticeKind::TaskFailed);
//! assert_eq!(n.task, Some(id));
//! assert_eq!(n.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use crate::model::{ActorId, JobId, NodeId, ProducerId, TaskId, WorkerId};

/// Classification of service notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    // === Ingestion ===
    /// A batch was merged.
    ///
    /// Sets: `producer`, `count` (events in batch).
    BatchIngested,
    /// A batch failed validation and was discarded.
    ///
    /// Sets: `producer`, `reason`.
    BatchRejected,
    /// A producer reported events it had to drop.
    ///
    /// Sets: `producer`, `count`, `reason` (event type).
    EventsDropped,

    // === Failures ===
    /// A task was reported or detected as failed (root cause).
    ///
    /// Sets: `task`, `reason` (error type).
    TaskFailed,
    /// Descendants of a failed task were failed.
    ///
    /// Sets: `task` (root), `count` (descendants failed).
    CascadeApplied,

    // === Death signals ===
    /// Sets: `worker`, `count` (tasks failed), `reason` (exit code).
    WorkerDied,
    /// Sets: `node`, `count` (tasks failed).
    NodeDied,
    /// Sets: `actor`, `reason`.
    ActorDead,
    /// Sets: `job`.
    JobEnded,

    // === Reconciliation ===
    /// Deferred sweep fired. Sets: `job`, `count` (tasks finalized).
    JobReconciled,
    /// Deferred sweep cancelled because every task settled. Sets: `job`.
    ReconcileCancelled,

    // === Subscriber health ===
    /// Subscriber queue full or closed. Sets: `reason`.
    SubscriberOverflow,
    /// Subscriber panicked. Sets: `reason`.
    SubscriberPanicked,
}

/// One service notice with optional metadata.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Bus-assigned, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    pub kind: NoticeKind,

    pub task: Option<TaskId>,
    pub actor: Option<ActorId>,
    pub job: Option<JobId>,
    pub worker: Option<WorkerId>,
    pub node: Option<NodeId>,
    pub producer: Option<ProducerId>,
    /// Count attached to the notice (events, tasks...).
    pub count: Option<u64>,
    /// Human-readable detail.
    pub reason: Option<Arc<str>>,
}

impl Notice {
    /// Creates a notice stamped with the current time.
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            task: None,
            actor: None,
            job: None,
            worker: None,
            node: None,
            producer: None,
            count: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    #[inline]
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    #[inline]
    pub fn with_job(mut self, job: JobId) -> Self {
        self.job = Some(job);
        self
    }

    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    #[inline]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    #[inline]
    pub fn with_producer(mut self, producer: ProducerId) -> Self {
        self.producer = Some(producer);
        self
    }

    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow notice.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Notice::new(NoticeKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic notice.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Notice::new(NoticeKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }

    #[inline]
    pub fn is_subscriber_health(&self) -> bool {
        matches!(
            self.kind,
            NoticeKind::SubscriberOverflow | NoticeKind::SubscriberPanicked
        )
    }
}
