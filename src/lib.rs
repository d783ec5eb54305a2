//! # tasklineage
//!
//! **tasklineage** tracks the lifecycle of tasks and actors in a distributed
//! task engine and propagates failures along the task tree.
//!
//! Task owners report what happens to their tasks as sequenced events. A
//! central [`StateService`] merges them into one record per task attempt,
//! keeps actor and job records, reacts to worker/node/actor/job death, and
//! answers filtered queries.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Producer   │   │   Producer   │   │   Producer   │
//!     │ (task owner) │   │ (task owner) │   │ (task owner) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ EventBuffer      │                  │
//!            ▼ Reporter         ▼                  ▼
//!     ──────────────── EventSink::send_batch(EventBatch) ─────────────────
//!                                   │
//! ┌─────────────────────────────────▼─────────────────────────────────┐
//! │  StateService                                                     │
//! │  - Gateway     (validate, merge, cascade)                         │
//! │  - Registry    (tasks, actors, jobs behind one RwLock)            │
//! │  - Propagator  (worker/node/actor death, ancestor failures)       │
//! │  - Reconciler  (job end + grace delay → sweep leftover tasks)     │
//! │  - QueryHandle (filtered snapshots)                               │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ publish(Notice)
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         subscriber listener
//!                                   ▼
//!                            SubscriberSet
//!                          ┌────────┼────────┐
//!                          ▼        ▼        ▼
//!                       sub1     sub2     subN   (Subscribe::on_notice)
//! ```
//!
//! ### Task lifecycle
//! ```text
//! PENDING ──► SUBMITTED ──► RUNNING ──► FINISHED
//!    │            │            │
//!    └────────────┴────────────┴──────► FAILED
//!
//! - states only move forward; stale or duplicate events are ignored
//! - FAILED on a task fails every non-terminal descendant (same error type)
//! - FINISHED on an actor creation task makes the actor ALIVE
//! ```
//!
//! ## Features
//! | Area               | Description                                                   | Key types / traits                          |
//! |--------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Reporting**      | Buffer, sequence and flush task events.                       | [`Producer`], [`Reporter`], [`EventSink`]   |
//! | **Tracking**       | Merge events, propagate failures, reconcile finished jobs.    | [`StateService`], [`ServiceBuilder`]        |
//! | **Queries**        | Filtered task/actor listings with optional detail.            | [`Filter`], [`ListOptions`], [`Listing`]    |
//! | **Subscriber API** | Observe merged facts and death signals.                       | [`Subscribe`], [`Notice`]                   |
//! | **Context**        | Attribute submissions from threads and async tasks.           | [`ExecutionContext`]                        |
//! | **Errors**         | Typed errors for ingestion, queries and delivery.             | [`IngestError`], [`QueryError`], [`SinkError`] |
//! | **Configuration**  | Centralize buffer, grace delay and retention settings.        | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use tasklineage::{
//!     Config, ErrorInfo, ErrorType, Filter, ListOptions, MetricsCounters, Producer, Reporter,
//!     StateService, TaskState, TaskSubmission,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let cfg = Config::default();
//!     let svc = StateService::new(cfg.clone());
//!
//!     let producer = Arc::new(Producer::new(&cfg, Arc::new(MetricsCounters::new())));
//!     let token = CancellationToken::new();
//!     let reporter = Reporter::new(Arc::clone(&producer), svc.clone(), &cfg).spawn(token.clone());
//!
//!     let task = producer.submit_task(None, TaskSubmission::normal("boom"));
//!     producer.task_failed(task, ErrorInfo::new(ErrorType::TaskExecutionException, "boom"));
//!
//!     token.cancel();
//!     reporter.await.unwrap();
//!
//!     let failed = svc
//!         .list_tasks(&[Filter::eq("state", "FAILED")], &ListOptions::default())
//!         .unwrap();
//!     assert_eq!(failed.len(), 1);
//!     assert_eq!(failed[0].state, TaskState::Failed);
//!     assert_eq!(failed[0].error_type, Some(ErrorType::TaskExecutionException));
//! }
//! ```
mod context;
mod core;
mod error;
mod events;
mod metrics;
mod model;
mod policies;
mod producer;
mod subscribers;

// ---- Public re-exports ----

pub use context::{ActorBinding, ExecutionContext};
pub use core::{
    ActorDetail, ActorView, Config, Filter, FilterOp, IngestReport, ListOptions, Listing,
    QueryHandle, Resource, Row, ServiceBuilder, StateService, TaskDetail, TaskView,
};
pub use error::{IngestError, QueryError, SinkError};
pub use events::{
    Bus, DropCounts, EventBatch, EventPayload, EventType, Notice, NoticeKind, ProfileSpan,
    SequenceRange, StatusUpdate, TaskEvent,
};
pub use metrics::{MetricsCounters, MetricsSnapshot};
pub use model::{
    ActorId, ActorRecord, ActorState, ErrorInfo, ErrorType, JobId, JobRecord, LogLocations,
    LogStream, NodeId, ProducerId, TaskId, TaskRecord, TaskState, TaskType, WorkerId, now_ms,
};
pub use policies::{BackoffPolicy, Jitter};
pub use producer::{
    EventBuffer, EventSink, Producer, Recorded, Reporter, TaskSubmission,
    wait_for_shutdown_signal,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
