//! # StateService: the central tracking service.
//!
//! [`StateService`] owns the registry, the notice bus, the gateway, the
//! reconciler and the subscriber fan-out, and exposes every external boundary:
//! batch ingestion, death signals, queries, metrics, log locations and actor
//! lifecycle calls.
//!
//! ## High-level architecture
//! ```text
//! Producers ── EventSink::send_batch ──► ingest() ──► Gateway ──► Registry (RwLock)
//!                                                        │            ▲
//! Death signals ── notify_*() ──► Propagator ────────────┼────────────┘
//!                       │                                │
//!                       └── job ended ──► Reconciler ────┘ (grace delay, cancellable)
//!
//! Every component ── publish(Notice) ──► Bus ──► listener ──► SubscriberSet ──► subscribers
//!
//! Queries ── list() ──► QueryHandle (weak, read guard, snapshot)
//! ```
//!
//! ## Example
//! ```rust
//! use tasklineage::{
//!     Config, EventBatch, Filter, ListOptions, ProducerId, StateService, StatusUpdate,
//!     TaskEvent, TaskId, TaskState,
//! };
//!
//! let svc = StateService::new(Config::default());
//! let producer = ProducerId::new();
//! let task = TaskId::new();
//!
//! let batch = EventBatch::from_events(
//!     producer,
//!     vec![
//!         TaskEvent::status(task, 1, 10, StatusUpdate::new(TaskState::Pending).with_name("f")),
//!         TaskEvent::status(task, 2, 20, StatusUpdate::new(TaskState::Finished)),
//!     ],
//! );
//! svc.ingest(&batch).unwrap();
//!
//! let rows = svc.list_tasks(&[Filter::eq("name", "f")], &ListOptions::default()).unwrap();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].state, TaskState::Finished);
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{IngestError, QueryError};
use crate::events::{Bus, EventBatch, Notice, NoticeKind, SequenceRange, TaskEvent};
use crate::metrics::{MetricsCounters, MetricsSnapshot};
use crate::model::{
    ActorId, ActorRecord, JobId, JobRecord, LogStream, NodeId, ProducerId, TaskId, TaskRecord,
    WorkerId, now_ms,
};
use crate::subscribers::SubscriberSet;

use super::builder::ServiceBuilder;
use super::gateway::{Gateway, IngestReport};
use super::propagate::{PropagationReport, Propagator, worker_died_message};
use super::query::{ActorView, Filter, ListOptions, Listing, QueryHandle, Resource, TaskView};
use super::reconciler::Reconciler;
use super::registry::SharedRegistry;
use super::Config;

/// Central task/actor lifecycle tracking service.
pub struct StateService {
    cfg: Config,
    bus: Bus,
    registry: SharedRegistry,
    metrics: Arc<MetricsCounters>,
    gateway: Gateway,
    reconciler: Arc<Reconciler>,
    query: QueryHandle,
    subs: Option<Arc<SubscriberSet>>,
    token: CancellationToken,
}

impl StateService {
    /// Creates a service without subscribers.
    pub fn new(cfg: Config) -> Arc<Self> {
        ServiceBuilder::new(cfg).build()
    }

    pub fn builder(cfg: Config) -> ServiceBuilder {
        ServiceBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        registry: SharedRegistry,
        metrics: Arc<MetricsCounters>,
        gateway: Gateway,
        reconciler: Arc<Reconciler>,
        query: QueryHandle,
        subs: Option<Arc<SubscriberSet>>,
        token: CancellationToken,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            metrics,
            gateway,
            reconciler,
            query,
            subs,
            token,
        }
    }

    /// Forwards bus notices to the subscriber set until shutdown.
    pub(crate) fn subscriber_listener(&self) {
        let Some(set) = self.subs.clone() else {
            return;
        };
        let mut rx = self.bus.subscribe();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(notice) => set.emit(&notice),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    // === Ingestion ===

    /// Merges one producer flush.
    pub fn submit_event_batch(
        &self,
        producer: ProducerId,
        range: Option<SequenceRange>,
        events: Vec<TaskEvent>,
    ) -> Result<IngestReport, IngestError> {
        let batch = EventBatch {
            producer_id: producer,
            range,
            events,
            dropped: Default::default(),
        };
        self.ingest(&batch)
    }

    /// Merges a complete batch, including its carried drop counts.
    pub fn ingest(&self, batch: &EventBatch) -> Result<IngestReport, IngestError> {
        self.gateway.ingest(batch)
    }

    // === Death signals ===

    /// Fails every live task that ran on `worker`. Returns tasks failed.
    pub fn notify_worker_died(&self, worker: WorkerId, exit_code: i32) -> u64 {
        let report = self.propagate(|p| p.worker_died(worker, exit_code));
        info!(%worker, exit_code, failed = report.tasks_failed(), "worker died");
        self.publish_signal(
            Notice::new(NoticeKind::WorkerDied)
                .with_worker(worker)
                .with_reason(worker_died_message(exit_code)),
            &report,
        )
    }

    /// Fails every live task that ran on `node`. Returns tasks failed.
    pub fn notify_node_died(&self, node: NodeId) -> u64 {
        let report = self.propagate(|p| p.node_died(node));
        info!(%node, failed = report.tasks_failed(), "node died");
        self.publish_signal(Notice::new(NoticeKind::NodeDied).with_node(node), &report)
    }

    /// Marks the actor dead and fails its live invocations. Returns tasks failed.
    pub fn notify_actor_died(&self, actor: ActorId, reason: &str) -> u64 {
        let report = self.propagate(|p| p.kill_actor(actor, reason));
        info!(%actor, reason, failed = report.tasks_failed(), "actor died");
        let failed = report.tasks_failed();
        for notice in report.notices() {
            self.bus.publish(notice);
        }
        self.reconciler.settle_all();
        failed
    }

    /// Registers a job start. Returns `false` if the job was already known.
    pub fn notify_job_started(&self, job: JobId) -> bool {
        self.registry.write().ensure_job(job, now_ms())
    }

    /// Marks the job finished, finishes its driver and arms the reconciler.
    pub fn notify_job_ended(&self, job: JobId) {
        let report = self.propagate(|p| {
            p.job_ended(job);
        });
        info!(%job, "job ended");
        self.bus.publish(Notice::new(NoticeKind::JobEnded).with_job(job));
        for notice in report.notices() {
            self.bus.publish(notice);
        }
        self.reconciler.schedule(job);
    }

    fn propagate(&self, f: impl FnOnce(&mut Propagator<'_>)) -> PropagationReport {
        let mut reg = self.registry.write();
        let mut prop = Propagator::new(&mut reg, now_ms());
        f(&mut prop);
        prop.finish()
    }

    fn publish_signal(&self, notice: Notice, report: &PropagationReport) -> u64 {
        let failed = report.tasks_failed();
        self.bus.publish(notice.with_count(failed));
        for notice in report.notices() {
            self.bus.publish(notice);
        }
        self.reconciler.settle_all();
        failed
    }

    // === Queries ===

    pub fn list(
        &self,
        resource: Resource,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Listing, QueryError> {
        self.query.list(resource, filters, opts)
    }

    pub fn list_tasks(
        &self,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Vec<TaskView>, QueryError> {
        self.query.list_tasks(filters, opts)
    }

    pub fn list_actors(
        &self,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Vec<ActorView>, QueryError> {
        self.query.list_actors(filters, opts)
    }

    /// Read-only handle that stays valid (but empty) after the service is dropped.
    pub fn query_handle(&self) -> QueryHandle {
        self.query.clone()
    }

    /// Snapshot of one task record.
    pub fn task(&self, id: TaskId) -> Option<TaskRecord> {
        self.registry.read().task(&id).cloned()
    }

    /// Snapshot of one actor record.
    pub fn actor(&self, id: ActorId) -> Option<ActorRecord> {
        self.registry.read().actor(&id).cloned()
    }

    /// Snapshot of one job record (gone once reconciled).
    pub fn job(&self, id: JobId) -> Option<JobRecord> {
        self.registry.read().job(&id).cloned()
    }

    // === Metrics ===

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics_counters(&self) -> Arc<MetricsCounters> {
        Arc::clone(&self.metrics)
    }

    // === Log locations ===

    /// Records where a task's output starts. Ignored when log recording is off.
    pub fn record_log_location(
        &self,
        task: TaskId,
        stream: LogStream,
        file: impl Into<String>,
        start_offset: u64,
    ) -> bool {
        self.registry
            .write()
            .record_log_location(task, stream, file.into(), start_offset, now_ms())
    }

    /// Completes a task's log end offset. Ignored when log recording is off.
    pub fn record_log_end(&self, task: TaskId, stream: LogStream, end_offset: u64) -> bool {
        self.registry.write().record_log_end(task, stream, end_offset)
    }

    // === Actors ===

    /// Registers an actor incarnation and its creation task.
    pub fn register_actor(
        &self,
        actor: ActorId,
        creation_task: TaskId,
        class_name: &str,
        job: Option<JobId>,
    ) -> bool {
        self.registry
            .write()
            .upsert_creation(actor, creation_task, Some(class_name), job)
    }

    pub fn mark_actor_alive(&self, actor: ActorId) -> bool {
        self.registry.write().mark_alive(actor)
    }

    /// Opens the next incarnation of a live actor.
    pub fn mark_actor_restarting(&self, actor: ActorId) -> bool {
        self.registry.write().mark_restarting(actor)
    }

    // === Lifecycle ===

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Job sweeps still waiting for their grace delay.
    pub fn pending_reconciliations(&self) -> usize {
        self.reconciler.pending()
    }

    /// Cancels pending sweeps and stops the subscriber listener.
    pub fn shutdown(&self) {
        self.reconciler.shutdown();
        self.token.cancel();
    }
}

impl Drop for StateService {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
