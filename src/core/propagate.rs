//! # Fault propagation.
//!
//! [`Propagator`] turns death signals and newly failed tasks into derived task
//! failures. It borrows the registry under the caller's write guard, so a
//! signal and all of its consequences become visible to readers at once.
//!
//! ```text
//! worker_died / node_died ──► fail matching live tasks ──┐
//! actor_died              ──► mark actor DEAD ───────────┤
//!                             fail its live invocations ─┤
//! ingestion (FAILED)      ──► adopt as root ─────────────┤
//!                                                        ▼
//!                      work queue: Cascade(root) | CascadeFrom(creation) | KillActor(actor)
//!                                                        │
//!                    BFS over children ◄─────────────────┘
//!                      ├─ non-terminal → FAILED (root's error type, derived message)
//!                      ├─ terminal     → untouched, walk continues below it
//!                      └─ creation task of a live actor → not entered
//! ```
//!
//! ## Rules
//! - Only non-terminal records are ever modified; terminal ones keep their
//!   original classification.
//! - Each task is visited at most once per cascade.
//! - A pending actor whose creation task is failed by a cascade dies too, and
//!   its invocations fail with `ACTOR_DIED`.
//! - A dead actor's subtree (everything below its creation task) is walked
//!   with `ACTOR_DIED`, even though the creation task itself finished.

use std::collections::{HashSet, VecDeque};

use crate::events::{Notice, NoticeKind};
use crate::model::{
    ActorId, ErrorInfo, ErrorType, JobId, NodeId, TaskId, TaskRecord, TaskState, TaskType,
    WorkerId,
};

use super::registry::Registry;

/// Message attached to tasks lost with their worker.
pub(crate) fn worker_died_message(exit_code: i32) -> String {
    format!("Worker exits with an exit code {exit_code}")
}

/// Message attached to tasks lost with their node.
pub(crate) const NODE_DIED_MESSAGE: &str = "Task failed due to the node dying";

/// Message attached to tasks left behind by a finished job.
pub(crate) fn job_finished_message(job: JobId) -> String {
    format!("Job {job} finished; marking non-terminal task as failed")
}

fn ancestor_failed_message(root: TaskId, root_message: &str) -> String {
    format!("Task failed because its ancestor task {root} failed: {root_message}")
}

/// What one propagation changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PropagationReport {
    /// Root failures, in the order they were applied.
    pub failed: Vec<(TaskId, ErrorType)>,
    /// Cascades that failed at least one descendant: `(root, descendants failed)`.
    pub cascades: Vec<(TaskId, u64)>,
    /// Actors newly marked dead, with the reason.
    pub actors_dead: Vec<(ActorId, String)>,
}

impl PropagationReport {
    /// Total number of tasks failed (roots and descendants).
    pub(crate) fn tasks_failed(&self) -> u64 {
        self.failed.len() as u64 + self.cascades.iter().map(|(_, n)| n).sum::<u64>()
    }

    /// Notices describing this report.
    pub(crate) fn notices(&self) -> Vec<Notice> {
        let mut out = Vec::with_capacity(
            self.failed.len() + self.cascades.len() + self.actors_dead.len(),
        );
        for (task, error_type) in &self.failed {
            out.push(
                Notice::new(NoticeKind::TaskFailed)
                    .with_task(*task)
                    .with_reason(error_type.as_str()),
            );
        }
        for (root, count) in &self.cascades {
            out.push(
                Notice::new(NoticeKind::CascadeApplied)
                    .with_task(*root)
                    .with_count(*count),
            );
        }
        for (actor, reason) in &self.actors_dead {
            out.push(
                Notice::new(NoticeKind::ActorDead)
                    .with_actor(*actor)
                    .with_reason(reason.as_str()),
            );
        }
        out
    }
}

enum Work {
    /// Walk below a failed task with an error derived from its own.
    Cascade(TaskId),
    /// Walk below `root` with the given error, whatever `root`'s state.
    CascadeFrom(TaskId, ErrorInfo),
    KillActor(ActorId, String),
}

/// Applies death signals and cascades to a borrowed registry.
pub(crate) struct Propagator<'a> {
    reg: &'a mut Registry,
    at_ms: u64,
    work: VecDeque<Work>,
    report: PropagationReport,
}

impl<'a> Propagator<'a> {
    pub(crate) fn new(reg: &'a mut Registry, at_ms: u64) -> Self {
        Self {
            reg,
            at_ms,
            work: VecDeque::new(),
            report: PropagationReport::default(),
        }
    }

    /// Treats an already `FAILED` task as a cascade root.
    pub(crate) fn adopt_root(&mut self, task: TaskId) {
        let error_type = self
            .reg
            .task(&task)
            .filter(|t| t.state == TaskState::Failed)
            .and_then(|t| t.error.as_ref())
            .map(|e| e.error_type);
        if let Some(error_type) = error_type {
            self.report.failed.push((task, error_type));
            self.work.push_back(Work::Cascade(task));
        }
    }

    /// Re-runs the cascade below an already-failed task (late children).
    pub(crate) fn recascade(&mut self, task: TaskId) {
        self.work.push_back(Work::Cascade(task));
    }

    /// Fails `task` with `error` if it is still live, then cascades from it.
    pub(crate) fn fail_root(&mut self, task: TaskId, error: ErrorInfo) -> bool {
        let error_type = error.error_type;
        let at = self.at_ms;
        let changed = self
            .reg
            .tasks
            .get_mut(&task)
            .is_some_and(|t| t.fail(error, at));
        if changed {
            self.report.failed.push((task, error_type));
            self.work.push_back(Work::Cascade(task));
        }
        changed
    }

    pub(crate) fn kill_actor(&mut self, actor: ActorId, reason: impl Into<String>) {
        self.work.push_back(Work::KillActor(actor, reason.into()));
    }

    /// Fails every live task that ran on `worker` and kills actors created there.
    pub(crate) fn worker_died(&mut self, worker: WorkerId, exit_code: i32) {
        let message = worker_died_message(exit_code);
        let error = ErrorInfo::new(ErrorType::WorkerDied, message.clone());
        for task in self.reg.live_tasks_where(|t| t.worker_id == Some(worker)) {
            self.fail_root(task, error.clone());
        }
        for actor in self.live_actors_where(|t| t.worker_id == Some(worker)) {
            self.kill_actor(actor, message.clone());
        }
    }

    /// Fails every live task that ran on `node` and kills actors created there.
    pub(crate) fn node_died(&mut self, node: NodeId) {
        let error = ErrorInfo::new(ErrorType::NodeDied, NODE_DIED_MESSAGE);
        for task in self.reg.live_tasks_where(|t| t.node_id == Some(node)) {
            self.fail_root(task, error.clone());
        }
        for actor in self.live_actors_where(|t| t.node_id == Some(node)) {
            self.kill_actor(actor, NODE_DIED_MESSAGE);
        }
    }

    /// Marks the job finished and finishes its driver task.
    ///
    /// Returns the driver task if it was finished by this call.
    pub(crate) fn job_ended(&mut self, job: JobId) -> Option<TaskId> {
        self.mark_job_finished(job);
        let driver = self.reg.driver_of(&job)?;
        let at = self.at_ms;
        self.reg
            .tasks
            .get_mut(&driver)
            .is_some_and(|t| t.finish(at))
            .then_some(driver)
    }

    /// Fails every live task of `job`. The job record stays, marked finished.
    ///
    /// Returns the number of tasks failed directly by the sweep.
    pub(crate) fn sweep_job(&mut self, job: JobId) -> u64 {
        self.mark_job_finished(job);
        let error = ErrorInfo::new(ErrorType::WorkerDied, job_finished_message(job));
        let mut swept = 0;
        for task in self.reg.live_tasks_of_job(&job) {
            if self.fail_root(task, error.clone()) {
                swept += 1;
            }
        }
        swept
    }

    fn mark_job_finished(&mut self, job: JobId) {
        self.reg.ensure_job(job, self.at_ms);
        if let Some(rec) = self.reg.jobs.get_mut(&job) {
            rec.is_finished = true;
            rec.end_time_ms.get_or_insert(self.at_ms);
        }
    }

    /// Drains the work queue and returns what changed.
    pub(crate) fn finish(mut self) -> PropagationReport {
        while let Some(work) = self.work.pop_front() {
            match work {
                Work::Cascade(root) => self.cascade(root),
                Work::CascadeFrom(root, error) => self.walk(root, error),
                Work::KillActor(actor, reason) => self.apply_actor_death(actor, &reason),
            }
        }
        self.report
    }

    fn live_actors_where(&self, on_host: impl Fn(&TaskRecord) -> bool) -> Vec<ActorId> {
        self.reg
            .actors_in_order()
            .filter(|a| !a.is_dead())
            .filter(|a| self.reg.task(&a.creation_task_id).is_some_and(|t| on_host(t)))
            .map(|a| a.id)
            .collect()
    }

    fn apply_actor_death(&mut self, actor: ActorId, reason: &str) {
        if self.reg.mark_dead(actor, reason) {
            self.report.actors_dead.push((actor, reason.to_owned()));
        }
        let creation = self.reg.actor(&actor).map(|a| a.creation_task_id);
        let victims = self.reg.live_tasks_where(|t| {
            t.actor_id == Some(actor)
                && (t.task_type == TaskType::ActorTask || Some(t.id) == creation)
        });
        let error = ErrorInfo::new(ErrorType::ActorDied, reason);
        for task in victims {
            self.fail_root(task, error.clone());
        }
        // Concurrent invocations parent their submissions to the creation task,
        // which is usually FINISHED and so never a cascade root.
        if let Some(creation) = creation {
            self.work.push_back(Work::CascadeFrom(creation, error));
        }
    }

    fn cascade(&mut self, root: TaskId) {
        let Some(root_error) = self
            .reg
            .task(&root)
            .filter(|t| t.state == TaskState::Failed)
            .and_then(|t| t.error.clone())
        else {
            return;
        };
        let derived = ErrorInfo::new(
            root_error.error_type,
            ancestor_failed_message(root, &root_error.error_message),
        );
        self.walk(root, derived);
    }

    fn walk(&mut self, root: TaskId, derived: ErrorInfo) {
        let mut seen = HashSet::from([root]);
        let mut queue: VecDeque<TaskId> = self.reg.children_of(&root).iter().copied().collect();
        let mut failed = 0u64;

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let Some(rec) = self.reg.task(&id) else {
                continue;
            };
            let creation_of = (rec.task_type == TaskType::ActorCreationTask)
                .then_some(rec.actor_id)
                .flatten();
            if creation_of.is_some_and(|actor| self.reg.actor_is_live(&actor)) {
                continue;
            }

            let at = self.at_ms;
            let changed = self
                .reg
                .tasks
                .get_mut(&id)
                .is_some_and(|t| t.fail(derived.clone(), at));
            if changed {
                failed += 1;
                if let Some(actor) = creation_of {
                    self.kill_actor(actor, derived.error_message.clone());
                }
            }
            queue.extend(self.reg.children_of(&id).iter().copied());
        }

        if failed > 0 {
            self.report.cascades.push((root, failed));
        }
    }
}
