//! # Producer: owner-side task event reporting.
//!
//! A [`Producer`] stamps every event with its own monotonically increasing
//! sequence number and records it in its [`EventBuffer`]. A flush turns the
//! buffer into one [`EventBatch`] for the [`Reporter`](crate::Reporter).
//!
//! ```text
//! submit_task(ctx, TaskSubmission) ──► PENDING (+ identity, parent from ctx)
//! task_running(..)                 ──► RUNNING (+ worker/node)
//! task_finished / task_failed      ──► FINISHED / FAILED
//! profile(task, span)              ──► profile event
//!                                        │
//!                                        ▼
//!                                   EventBuffer ── flush_batch() ──► EventBatch
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::ExecutionContext;
use crate::core::Config;
use crate::events::{EventBatch, ProfileSpan, StatusUpdate, TaskEvent};
use crate::metrics::MetricsCounters;
use crate::model::{
    ActorId, ErrorInfo, JobId, NodeId, ProducerId, TaskId, TaskState, TaskType, WorkerId, now_ms,
};

use super::buffer::{EventBuffer, Recorded};

/// Description of a task being submitted.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    id: TaskId,
    name: String,
    task_type: TaskType,
    job: Option<JobId>,
    parent: Option<TaskId>,
    actor: Option<ActorId>,
    actor_class: Option<String>,
    logical: Option<TaskId>,
    attempt: u32,
}

impl TaskSubmission {
    fn with_type(name: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            id: TaskId::new(),
            name: name.into(),
            task_type,
            job: None,
            parent: None,
            actor: None,
            actor_class: None,
            logical: None,
            attempt: 0,
        }
    }

    /// A plain remote function call.
    pub fn normal(name: impl Into<String>) -> Self {
        Self::with_type(name, TaskType::NormalTask)
    }

    /// A method call on `actor`.
    pub fn actor_task(name: impl Into<String>, actor: ActorId) -> Self {
        let mut sub = Self::with_type(name, TaskType::ActorTask);
        sub.actor = Some(actor);
        sub
    }

    /// The constructor of `actor`; named `<class>.__init__`.
    pub fn actor_creation(class_name: impl Into<String>, actor: ActorId) -> Self {
        let class_name = class_name.into();
        let mut sub = Self::with_type(format!("{class_name}.__init__"), TaskType::ActorCreationTask);
        sub.actor = Some(actor);
        sub.actor_class = Some(class_name);
        sub
    }

    /// The root task of `job`.
    pub fn driver(job: JobId) -> Self {
        let mut sub = Self::with_type("driver", TaskType::DriverTask);
        sub.job = Some(job);
        sub
    }

    pub fn with_job(mut self, job: JobId) -> Self {
        self.job = Some(job);
        self
    }

    /// Overrides the parent taken from the execution context.
    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Marks this submission as retry `attempt` of `logical`.
    pub fn retry_of(mut self, logical: TaskId, attempt: u32) -> Self {
        self.logical = Some(logical);
        self.attempt = attempt;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

/// Owner-side reporter of task events.
pub struct Producer {
    id: ProducerId,
    seq: AtomicU64,
    buffer: EventBuffer,
}

impl Producer {
    pub fn new(cfg: &Config, metrics: Arc<MetricsCounters>) -> Self {
        Self::with_buffer(EventBuffer::new(cfg, metrics))
    }

    pub fn with_buffer(buffer: EventBuffer) -> Self {
        Self {
            id: ProducerId::new(),
            seq: AtomicU64::new(1),
            buffer,
        }
    }

    #[inline]
    pub fn id(&self) -> ProducerId {
        self.id
    }

    pub fn buffer(&self) -> &EventBuffer {
        &self.buffer
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Reports a status update observed now.
    pub fn report(&self, task: TaskId, update: StatusUpdate) -> Recorded {
        self.report_at(task, now_ms(), update)
    }

    /// Reports a status update observed at `at_ms`.
    pub fn report_at(&self, task: TaskId, at_ms: u64, update: StatusUpdate) -> Recorded {
        self.buffer
            .record(TaskEvent::status(task, self.next_seq(), at_ms, update))
    }

    /// Reports a profiling span.
    pub fn profile(&self, task: TaskId, span: ProfileSpan) -> Recorded {
        self.buffer
            .record(TaskEvent::profile(task, self.next_seq(), span))
    }

    /// Reports a new task as `PENDING` and returns its id.
    ///
    /// The parent is the submission's explicit parent, else the context's
    /// [`submission_parent`](ExecutionContext::submission_parent). The job is
    /// inherited from the context the same way.
    pub fn submit_task(&self, ctx: Option<&ExecutionContext>, sub: TaskSubmission) -> TaskId {
        let parent = sub.parent.or(ctx.map(ExecutionContext::submission_parent));
        let job = sub.job.or(ctx.and_then(|c| c.job_id));

        let mut update = StatusUpdate::new(TaskState::Pending)
            .with_name(sub.name)
            .with_task_type(sub.task_type)
            .with_attempt(sub.attempt);
        update.parent_task_id = parent;
        update.job_id = job;
        update.actor_id = sub.actor;
        update.actor_class_name = sub.actor_class;
        update.logical_task_id = sub.logical;

        self.report(sub.id, update);
        sub.id
    }

    pub fn task_submitted(&self, task: TaskId) -> Recorded {
        self.report(task, StatusUpdate::new(TaskState::Submitted))
    }

    pub fn task_running(&self, task: TaskId, worker: WorkerId, node: NodeId) -> Recorded {
        self.report(
            task,
            StatusUpdate::new(TaskState::Running)
                .with_worker(worker)
                .with_node(node),
        )
    }

    pub fn task_finished(&self, task: TaskId) -> Recorded {
        self.report(task, StatusUpdate::new(TaskState::Finished))
    }

    pub fn task_failed(&self, task: TaskId, error: ErrorInfo) -> Recorded {
        self.report(task, StatusUpdate::failed(error))
    }

    /// Cancellation is a failure with `TASK_CANCELLED`.
    pub fn task_cancelled(&self, task: TaskId) -> Recorded {
        self.task_failed(task, ErrorInfo::cancelled())
    }

    /// Drains the buffer into a batch.
    ///
    /// Returns `None` when there is neither an event nor a drop to report.
    pub fn flush_batch(&self) -> Option<EventBatch> {
        let (events, dropped) = self.buffer.flush();
        if events.is_empty() && dropped.is_zero() {
            return None;
        }
        Some(EventBatch::from_events(self.id, events).with_dropped(dropped))
    }

    /// Puts an undelivered batch back into the buffer.
    pub fn requeue(&self, batch: EventBatch) {
        self.buffer.requeue(batch.events, batch.dropped);
    }

    /// Gives up on a batch; its events are counted as dropped.
    pub fn discard(&self, batch: EventBatch) {
        self.buffer.discard(&batch.events, batch.dropped);
    }
}
