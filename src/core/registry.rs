//! # Registry: authoritative task, actor and job state.
//!
//! One [`Registry`] value holds every record the service knows about and lives
//! behind a single `parking_lot::RwLock` ([`SharedRegistry`]). Writers (gateway,
//! propagator, reconciler) take the write guard for a whole batch or signal;
//! readers (query engine) take the read guard and clone.
//!
//! ```text
//! Registry
//!  ├─ tasks     : TaskId  → TaskRecord       (+ insertion order)
//!  ├─ children  : TaskId  → [TaskId]         (parent adjacency, built on merge)
//!  ├─ actors    : ActorId → ActorRecord      (+ insertion order)
//!  └─ jobs      : JobId   → JobRecord
//! ```
//!
//! ## Rules
//! - Records are created lazily: the first event mentioning an id creates it.
//! - The children index may reference parents that are not (yet) recorded.
//! - Actor transitions are idempotent; `DEAD` is entered once per incarnation.
//! - Log start offsets are only recorded on running records; end offsets are
//!   accepted even after the task became terminal.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::Config;
use crate::model::{
    ActorId, ActorRecord, ActorState, JobId, JobRecord, LogLocations, LogStream, TaskId,
    TaskRecord, TaskType,
};

/// Registry shared between the service components.
pub(crate) type SharedRegistry = Arc<RwLock<Registry>>;

/// All task, actor and job records of one service instance.
#[derive(Debug)]
pub(crate) struct Registry {
    pub(super) tasks: HashMap<TaskId, TaskRecord>,
    pub(super) order: Vec<TaskId>,
    pub(super) children: HashMap<TaskId, Vec<TaskId>>,
    pub(super) actors: HashMap<ActorId, ActorRecord>,
    pub(super) actor_order: Vec<ActorId>,
    pub(super) jobs: HashMap<JobId, JobRecord>,
    pub(super) profile_cap: Option<usize>,
    pub(super) record_logs: bool,
}

impl Registry {
    pub(crate) fn new(cfg: &Config) -> Self {
        Self {
            tasks: HashMap::new(),
            order: Vec::new(),
            children: HashMap::new(),
            actors: HashMap::new(),
            actor_order: Vec::new(),
            jobs: HashMap::new(),
            profile_cap: cfg.profile_history_cap(),
            record_logs: cfg.record_task_logs,
        }
    }

    pub(crate) fn shared(cfg: &Config) -> SharedRegistry {
        Arc::new(RwLock::new(Self::new(cfg)))
    }

    // === Tasks ===

    pub(crate) fn task(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    /// Tasks in insertion order.
    pub(crate) fn tasks_in_order(&self) -> impl Iterator<Item = &TaskRecord> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Returns the record for `id`, creating a `PENDING` placeholder if unknown.
    pub(super) fn task_entry(&mut self, id: TaskId, at_ms: u64) -> &mut TaskRecord {
        let order = &mut self.order;
        self.tasks.entry(id).or_insert_with(|| {
            order.push(id);
            TaskRecord::placeholder(id, at_ms)
        })
    }

    pub(super) fn link_child(&mut self, parent: TaskId, child: TaskId) {
        let kids = self.children.entry(parent).or_default();
        if !kids.contains(&child) {
            kids.push(child);
        }
    }

    pub(super) fn children_of(&self, parent: &TaskId) -> &[TaskId] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-terminal tasks matching `pred`, in insertion order.
    pub(super) fn live_tasks_where(&self, pred: impl Fn(&TaskRecord) -> bool) -> Vec<TaskId> {
        self.tasks_in_order()
            .filter(|t| !t.is_terminal() && pred(t))
            .map(|t| t.id)
            .collect()
    }

    // === Log locations ===

    /// Records where `task`'s `stream` output starts. Returns `true` if stored.
    pub(crate) fn record_log_location(
        &mut self,
        task: TaskId,
        stream: LogStream,
        file: String,
        start_offset: u64,
        at_ms: u64,
    ) -> bool {
        if !self.record_logs {
            return false;
        }
        let rec = self.task_entry(task, at_ms);
        if rec.is_terminal() {
            return false;
        }
        rec.log_locations
            .get_or_insert_with(LogLocations::default)
            .set_start(stream, file, start_offset);
        true
    }

    /// Completes the end offset of `task`'s `stream`. Allowed on terminal records.
    pub(crate) fn record_log_end(&mut self, task: TaskId, stream: LogStream, end_offset: u64) -> bool {
        if !self.record_logs {
            return false;
        }
        match self.tasks.get_mut(&task).and_then(|t| t.log_locations.as_mut()) {
            Some(locs) => {
                locs.set_end(stream, end_offset);
                true
            }
            None => false,
        }
    }

    // === Actors ===

    pub(crate) fn actor(&self, id: &ActorId) -> Option<&ActorRecord> {
        self.actors.get(id)
    }

    /// Actors in insertion order.
    pub(crate) fn actors_in_order(&self) -> impl Iterator<Item = &ActorRecord> {
        self.actor_order.iter().filter_map(|id| self.actors.get(id))
    }

    /// Registers the creation of an actor incarnation.
    ///
    /// A restarting actor adopts the new creation task; otherwise an existing
    /// record only gets its missing class name and job filled in.
    /// Returns `true` if a new record was created.
    pub(crate) fn upsert_creation(
        &mut self,
        actor: ActorId,
        creation_task: TaskId,
        class_name: Option<&str>,
        job: Option<JobId>,
    ) -> bool {
        if let Some(rec) = self.actors.get_mut(&actor) {
            if rec.state == ActorState::Restarting {
                rec.creation_task_id = creation_task;
            }
            if rec.class_name.is_empty() {
                if let Some(class) = class_name {
                    rec.class_name = class.to_owned();
                }
            }
            if rec.job_id.is_none() {
                rec.job_id = job;
            }
            return false;
        }
        let class = class_name.unwrap_or_default().to_owned();
        self.actors
            .insert(actor, ActorRecord::new(actor, creation_task, class, job));
        self.actor_order.push(actor);
        true
    }

    /// `PENDING | RESTARTING → ALIVE`. Returns `true` on change.
    pub(crate) fn mark_alive(&mut self, actor: ActorId) -> bool {
        match self.actors.get_mut(&actor) {
            Some(rec) if matches!(rec.state, ActorState::Pending | ActorState::Restarting) => {
                rec.state = ActorState::Alive;
                true
            }
            _ => false,
        }
    }

    /// `PENDING | ALIVE → RESTARTING`, opening the next incarnation.
    pub(crate) fn mark_restarting(&mut self, actor: ActorId) -> bool {
        match self.actors.get_mut(&actor) {
            Some(rec) if matches!(rec.state, ActorState::Pending | ActorState::Alive) => {
                rec.state = ActorState::Restarting;
                rec.incarnation += 1;
                rec.num_restarts += 1;
                true
            }
            _ => false,
        }
    }

    /// Marks the actor `DEAD` with `reason`. No-op if already dead or unknown.
    pub(crate) fn mark_dead(&mut self, actor: ActorId, reason: &str) -> bool {
        match self.actors.get_mut(&actor) {
            Some(rec) if !rec.is_dead() => {
                rec.state = ActorState::Dead;
                rec.death_cause = Some(reason.to_owned());
                true
            }
            _ => false,
        }
    }

    /// `true` if the actor exists and is `ALIVE` or `RESTARTING`.
    pub(super) fn actor_is_live(&self, actor: &ActorId) -> bool {
        self.actors
            .get(actor)
            .is_some_and(|a| matches!(a.state, ActorState::Alive | ActorState::Restarting))
    }

    // === Jobs ===

    pub(crate) fn job(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    /// Creates the job record if absent. Returns `true` if created.
    pub(crate) fn ensure_job(&mut self, job: JobId, at_ms: u64) -> bool {
        if self.jobs.contains_key(&job) {
            return false;
        }
        self.jobs.insert(job, JobRecord::new(job, at_ms));
        true
    }

    pub(super) fn note_driver(&mut self, job: JobId, driver: TaskId) {
        if let Some(rec) = self.jobs.get_mut(&job) {
            rec.driver_task_id.get_or_insert(driver);
        }
    }

    /// Tasks of `job` that are still non-terminal.
    pub(super) fn live_tasks_of_job(&self, job: &JobId) -> Vec<TaskId> {
        self.live_tasks_where(|t| t.job_id.as_ref() == Some(job))
    }

    /// The driver task of `job`, falling back to a scan by type.
    pub(super) fn driver_of(&self, job: &JobId) -> Option<TaskId> {
        self.jobs
            .get(job)
            .and_then(|j| j.driver_task_id)
            .or_else(|| {
                self.tasks_in_order()
                    .find(|t| t.task_type == TaskType::DriverTask && t.job_id.as_ref() == Some(job))
                    .map(|t| t.id)
            })
    }
}
