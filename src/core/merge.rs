//! # Merge: folding task events into the registry.
//!
//! Events from many producers arrive late, duplicated and out of order. The
//! merge keeps every record converging to the same result regardless:
//!
//! ```text
//! event ──► stale? (seq <= last seq of this producer for this task) ──► drop
//!   │
//!   ├─ Status ─► fill missing identity (name, type, parent, job, actor, worker, node)
//!   │           └─► advance state if strictly forward and not terminal
//!   │                 ├─ RUNNING   → start_time
//!   │                 ├─ FINISHED  → end_time, error cleared
//!   │                 └─ FAILED    → end_time, error (defaulted if missing)
//!   │
//!   └─ Profile ─► append span (bounded history, oldest evicted)
//! ```
//!
//! ## Rules
//! - Identity fields are filled once and never overwritten, even on terminal
//!   records (a late submission event still names a cancelled task).
//! - Terminal records ignore state, error and timestamp changes.
//! - A cancellation that lands before the task started carries no message.
//! - Consequences that need the whole graph (cascades, actor death, late
//!   children) are collected into [`MergeEffects`] and resolved by the caller.

use crate::events::{EventPayload, ProfileSpan, StatusUpdate, TaskEvent};
use crate::model::{
    ActorId, ErrorInfo, ErrorType, JobId, ProducerId, TaskId, TaskRecord, TaskState, TaskType,
};

use super::registry::Registry;

/// Result of merging one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    /// Sequence number already seen from this producer for this task.
    Stale,
    /// A new record was created.
    Created,
    /// The record moved forward in its state machine.
    Advanced,
    /// Only metadata or profiling data changed.
    Updated,
    /// Nothing changed.
    Ignored,
}

impl MergeOutcome {
    /// Counted toward the `stored` metric.
    #[inline]
    pub(crate) fn is_stored(self) -> bool {
        matches!(self, MergeOutcome::Created | MergeOutcome::Advanced)
    }
}

/// Follow-ups collected while merging a batch.
#[derive(Debug, Default)]
pub(crate) struct MergeEffects {
    /// Tasks that became `FAILED` through ingestion.
    pub failed: Vec<TaskId>,
    /// Already-failed parents that just gained a non-terminal child.
    pub late_parents: Vec<TaskId>,
    /// Actors whose creation task finished.
    pub actors_alive: Vec<ActorId>,
    /// Actors whose creation task failed, with the failure message.
    pub actors_dead: Vec<(ActorId, String)>,
    /// Jobs referenced by merged records.
    pub jobs: Vec<JobId>,
}

impl MergeEffects {
    fn touch_job(&mut self, job: JobId) {
        if !self.jobs.contains(&job) {
            self.jobs.push(job);
        }
    }
}

/// Identity fields newly filled by one update.
#[derive(Default)]
struct Filled {
    any: bool,
    parent: Option<TaskId>,
    job: Option<JobId>,
}

impl Registry {
    /// Merges one event from `producer`.
    pub(crate) fn apply(
        &mut self,
        producer: ProducerId,
        event: &TaskEvent,
        fx: &mut MergeEffects,
    ) -> MergeOutcome {
        let known = match self.tasks.get(&event.task_id) {
            Some(rec) => {
                if rec
                    .last_seq
                    .get(&producer)
                    .is_some_and(|&last| event.seq <= last)
                {
                    return MergeOutcome::Stale;
                }
                true
            }
            None => false,
        };

        let outcome = match &event.payload {
            EventPayload::Status(update) => self.apply_status(event, update, fx),
            EventPayload::Profile(span) => self.apply_profile(event, span),
        };

        if let Some(rec) = self.tasks.get_mut(&event.task_id) {
            rec.last_seq.insert(producer, event.seq);
        }
        if known { outcome } else { MergeOutcome::Created }
    }

    fn apply_status(
        &mut self,
        event: &TaskEvent,
        update: &StatusUpdate,
        fx: &mut MergeEffects,
    ) -> MergeOutcome {
        let id = event.task_id;
        let at = event.at_ms;

        let rec = self.task_entry(id, at);
        let filled = fill_identity(rec, update);
        let advanced = match update.state {
            Some(next) if rec.state.can_advance_to(next) => {
                transition(rec, next, update.error.as_ref(), at);
                true
            }
            _ => false,
        };

        let state = rec.state;
        let task_type = rec.task_type;
        let actor = rec.actor_id;
        let job = rec.job_id;
        let failure = rec.error.as_ref().map(|e| e.error_message.clone());

        if let Some(parent) = filled.parent {
            self.link_child(parent, id);
            let parent_failed = self
                .tasks
                .get(&parent)
                .is_some_and(|p| p.state == TaskState::Failed);
            if parent_failed && !state.is_terminal() {
                fx.late_parents.push(parent);
            }
        }

        if let Some(job) = filled.job {
            self.ensure_job(job, at);
        }
        if let Some(job) = job {
            if task_type == TaskType::DriverTask {
                self.note_driver(job, id);
            }
            fx.touch_job(job);
        }

        if task_type == TaskType::ActorCreationTask {
            if let Some(actor) = actor {
                self.upsert_creation(actor, id, update.actor_class_name.as_deref(), job);
                if advanced {
                    match state {
                        TaskState::Finished => {
                            if self.mark_alive(actor) {
                                fx.actors_alive.push(actor);
                            }
                        }
                        TaskState::Failed => {
                            fx.actors_dead.push((actor, failure.unwrap_or_default()));
                        }
                        _ => {}
                    }
                }
            }
        }

        if advanced && state == TaskState::Failed {
            fx.failed.push(id);
        }

        if advanced {
            MergeOutcome::Advanced
        } else if filled.any {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Ignored
        }
    }

    fn apply_profile(&mut self, event: &TaskEvent, span: &ProfileSpan) -> MergeOutcome {
        let cap = self.profile_cap;
        let rec = self.task_entry(event.task_id, event.at_ms);
        if let Some(cap) = cap {
            if rec.profile_events.len() >= cap {
                rec.profile_events.remove(0);
            }
        }
        rec.profile_events.push(span.clone());
        MergeOutcome::Updated
    }
}

fn fill_identity(rec: &mut TaskRecord, update: &StatusUpdate) -> Filled {
    let mut filled = Filled::default();

    if let Some(name) = update.name.as_deref() {
        if rec.name.is_empty() && !name.is_empty() {
            rec.name = name.to_owned();
            filled.any = true;
        }
    }
    if let Some(task_type) = update.task_type {
        if !rec.typed {
            rec.task_type = task_type;
            rec.typed = true;
            filled.any = true;
        }
    }
    if let Some(logical) = update.logical_task_id {
        if rec.logical_task_id == rec.id && logical != rec.id {
            rec.logical_task_id = logical;
            filled.any = true;
        }
    }
    if let Some(attempt) = update.attempt_number {
        if attempt > rec.attempt_number {
            rec.attempt_number = attempt;
            filled.any = true;
        }
    }
    if rec.parent_task_id.is_none() {
        if let Some(parent) = update.parent_task_id.filter(|p| *p != rec.id) {
            rec.parent_task_id = Some(parent);
            filled.parent = Some(parent);
            filled.any = true;
        }
    }
    if rec.job_id.is_none() {
        if let Some(job) = update.job_id {
            rec.job_id = Some(job);
            filled.job = Some(job);
            filled.any = true;
        }
    }
    filled.any |= fill(&mut rec.actor_id, update.actor_id);
    filled.any |= fill(&mut rec.worker_id, update.worker_id);
    filled.any |= fill(&mut rec.node_id, update.node_id);

    filled
}

fn fill<T: Copy>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match (slot.is_none(), value) {
        (true, Some(v)) => {
            *slot = Some(v);
            true
        }
        _ => false,
    }
}

fn transition(rec: &mut TaskRecord, next: TaskState, error: Option<&ErrorInfo>, at_ms: u64) {
    rec.state = next;
    match next {
        TaskState::Running => {
            rec.start_time_ms.get_or_insert(at_ms);
        }
        TaskState::Finished => {
            rec.end_time_ms = Some(at_ms);
            rec.error = None;
        }
        TaskState::Failed => {
            let mut err = error
                .cloned()
                .unwrap_or_else(|| ErrorInfo::new(ErrorType::TaskExecutionException, ""));
            if err.error_type == ErrorType::TaskCancelled && rec.start_time_ms.is_none() {
                err.error_message.clear();
            }
            rec.error = Some(err);
            rec.end_time_ms = Some(at_ms);
        }
        TaskState::Pending | TaskState::Submitted => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::model::WorkerId;

    fn status(id: TaskId, seq: u64, update: StatusUpdate) -> TaskEvent {
        TaskEvent::status(id, seq, seq * 10, update)
    }

    fn merge(reg: &mut Registry, producer: ProducerId, ev: TaskEvent) -> MergeOutcome {
        reg.apply(producer, &ev, &mut MergeEffects::default())
    }

    #[test]
    fn state_never_regresses() {
        let mut reg = Registry::new(&Config::default());
        let p = ProducerId::new();
        let id = TaskId::new();

        assert_eq!(
            merge(&mut reg, p, status(id, 3, StatusUpdate::new(TaskState::Running))),
            MergeOutcome::Created
        );
        assert_eq!(
            merge(&mut reg, ProducerId::new(), status(id, 1, StatusUpdate::new(TaskState::Submitted))),
            MergeOutcome::Ignored
        );
        let rec = reg.task(&id).unwrap();
        assert_eq!(rec.state, TaskState::Running);
        assert_eq!(rec.start_time_ms, Some(30));
    }

    #[test]
    fn stale_sequence_from_same_producer_is_rejected() {
        let mut reg = Registry::new(&Config::default());
        let p = ProducerId::new();
        let id = TaskId::new();

        merge(&mut reg, p, status(id, 5, StatusUpdate::new(TaskState::Pending)));
        assert_eq!(
            merge(&mut reg, p, status(id, 5, StatusUpdate::new(TaskState::Finished))),
            MergeOutcome::Stale
        );
        assert_eq!(reg.task(&id).unwrap().state, TaskState::Pending);
    }

    #[test]
    fn identity_is_filled_but_not_overwritten_after_terminal() {
        let mut reg = Registry::new(&Config::default());
        let p = ProducerId::new();
        let id = TaskId::new();

        merge(&mut reg, p, status(id, 1, StatusUpdate::failed(ErrorInfo::cancelled())));
        let out = merge(
            &mut reg,
            ProducerId::new(),
            status(id, 1, StatusUpdate::new(TaskState::Pending).with_name("late")),
        );
        assert_eq!(out, MergeOutcome::Updated);

        merge(
            &mut reg,
            p,
            status(id, 2, StatusUpdate::metadata().with_name("other").with_worker(WorkerId::new())),
        );
        let rec = reg.task(&id).unwrap();
        assert_eq!(rec.name, "late");
        assert_eq!(rec.state, TaskState::Failed);
        assert!(rec.worker_id.is_some());
    }

    #[test]
    fn cancellation_before_start_has_empty_message() {
        let mut reg = Registry::new(&Config::default());
        let id = TaskId::new();
        let err = ErrorInfo::new(ErrorType::TaskCancelled, "cancelled by user");
        merge(&mut reg, ProducerId::new(), status(id, 1, StatusUpdate::failed(err)));

        let rec = reg.task(&id).unwrap();
        assert_eq!(rec.error, Some(ErrorInfo::cancelled()));
    }

    #[test]
    fn failed_without_detail_defaults_to_execution_exception() {
        let mut reg = Registry::new(&Config::default());
        let id = TaskId::new();
        let mut fx = MergeEffects::default();
        reg.apply(
            ProducerId::new(),
            &status(id, 1, StatusUpdate::new(TaskState::Failed)),
            &mut fx,
        );

        assert_eq!(fx.failed, vec![id]);
        let err = reg.task(&id).unwrap().error.clone().unwrap();
        assert_eq!(err.error_type, ErrorType::TaskExecutionException);
    }

    #[test]
    fn late_child_of_failed_parent_is_reported() {
        let mut reg = Registry::new(&Config::default());
        let p = ProducerId::new();
        let (parent, child) = (TaskId::new(), TaskId::new());
        merge(&mut reg, p, status(parent, 1, StatusUpdate::failed(ErrorInfo::new(ErrorType::TaskExecutionException, "boom"))));

        let mut fx = MergeEffects::default();
        reg.apply(
            p,
            &status(child, 2, StatusUpdate::new(TaskState::Pending).with_parent(parent)),
            &mut fx,
        );
        assert_eq!(fx.late_parents, vec![parent]);
        assert_eq!(reg.children_of(&parent), &[child]);
    }

    #[test]
    fn creation_task_drives_actor_state() {
        let mut reg = Registry::new(&Config::default());
        let p = ProducerId::new();
        let actor = ActorId::new();
        let creation = TaskId::new();

        let mut fx = MergeEffects::default();
        let submit = StatusUpdate::new(TaskState::Submitted)
            .with_task_type(TaskType::ActorCreationTask)
            .with_actor(actor)
            .with_actor_class("Counter");
        reg.apply(p, &status(creation, 1, submit), &mut fx);
        reg.apply(p, &status(creation, 2, StatusUpdate::new(TaskState::Finished)), &mut fx);

        assert_eq!(fx.actors_alive, vec![actor]);
        let rec = reg.actor(&actor).unwrap();
        assert_eq!(rec.class_name, "Counter");
        assert_eq!(rec.creation_task_id, creation);
        assert_eq!(rec.state, crate::model::ActorState::Alive);
    }

    #[test]
    fn profile_history_is_bounded() {
        let cfg = Config {
            max_profile_events_per_task: 2,
            ..Config::default()
        };
        let mut reg = Registry::new(&cfg);
        let p = ProducerId::new();
        let id = TaskId::new();
        for seq in 1..=3 {
            let span = ProfileSpan::new("worker", format!("span-{seq}"), seq, seq + 1);
            merge(&mut reg, p, TaskEvent::profile(id, seq, span));
        }
        let names: Vec<_> = reg
            .task(&id)
            .unwrap()
            .profile_events
            .iter()
            .map(|s| s.event_name.clone())
            .collect();
        assert_eq!(names, vec!["span-2", "span-3"]);
    }
}
