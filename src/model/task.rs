//! # Task records and their state machine.
//!
//! ```text
//! PENDING ──► SUBMITTED ──► RUNNING ──┬──► FINISHED
//!    │            │            │       │
//!    └────────────┴────────────┴───────┴──► FAILED   (error_type set)
//! ```
//!
//! ## Rules
//! - Transitions only move **forward**; skipping intermediate states is allowed.
//! - `FINISHED` and `FAILED` are terminal: nothing moves a record out of them.
//! - Cancellation is not a separate state: it is `FAILED` with
//!   [`ErrorType::TaskCancelled`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ActorId, JobId, NodeId, ProducerId, TaskId, WorkerId};
use crate::events::ProfileSpan;

/// Lifecycle state of one task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Known to the owner, not yet handed to the scheduler.
    Pending,
    /// Handed to the scheduler, waiting for a worker.
    Submitted,
    /// Executing on a worker.
    Running,
    /// Completed successfully (terminal).
    Finished,
    /// Failed, cancelled or lost (terminal).
    Failed,
}

impl TaskState {
    fn rank(self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::Submitted => 1,
            TaskState::Running => 2,
            TaskState::Finished | TaskState::Failed => 3,
        }
    }

    /// Returns `true` for `FINISHED` and `FAILED`.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Finished | TaskState::Failed)
    }

    /// Returns `true` if `next` is strictly further along the state machine.
    ///
    /// ```
    /// use tasklineage::TaskState;
    ///
    /// assert!(TaskState::Pending.can_advance_to(TaskState::Running));
    /// assert!(!TaskState::Running.can_advance_to(TaskState::Submitted));
    /// assert!(!TaskState::Finished.can_advance_to(TaskState::Failed));
    /// ```
    #[inline]
    pub fn can_advance_to(self, next: TaskState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Stable upper-case name, as used in queries.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Submitted => "SUBMITTED",
            TaskState::Running => "RUNNING",
            TaskState::Finished => "FINISHED",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Stateless remote function.
    NormalTask,
    /// Constructor of an actor.
    ActorCreationTask,
    /// Method invocation on an actor.
    ActorTask,
    /// The driver process of a job.
    DriverTask,
}

impl TaskType {
    /// Stable upper-case name, as used in queries.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::NormalTask => "NORMAL_TASK",
            TaskType::ActorCreationTask => "ACTOR_CREATION_TASK",
            TaskType::ActorTask => "ACTOR_TASK",
            TaskType::DriverTask => "DRIVER_TASK",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification attached to a `FAILED` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// User code raised.
    TaskExecutionException,
    /// Explicit cancellation.
    TaskCancelled,
    /// The executing worker process exited.
    WorkerDied,
    /// The executing node was lost.
    NodeDied,
    /// The owning actor was killed or crashed.
    ActorDied,
    /// Runtime environment provisioning failed.
    RuntimeEnvSetupFailed,
    /// Placement constraints could not be satisfied.
    TaskUnschedulableError,
}

impl ErrorType {
    /// Stable upper-case name, as used in queries.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::TaskExecutionException => "TASK_EXECUTION_EXCEPTION",
            ErrorType::TaskCancelled => "TASK_CANCELLED",
            ErrorType::WorkerDied => "WORKER_DIED",
            ErrorType::NodeDied => "NODE_DIED",
            ErrorType::ActorDied => "ACTOR_DIED",
            ErrorType::RuntimeEnvSetupFailed => "RUNTIME_ENV_SETUP_FAILED",
            ErrorType::TaskUnschedulableError => "TASK_UNSCHEDULABLE_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail of a failed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error_type: ErrorType,
    pub error_message: String,
}

impl ErrorInfo {
    pub fn new(error_type: ErrorType, error_message: impl Into<String>) -> Self {
        Self {
            error_type,
            error_message: error_message.into(),
        }
    }

    /// Cancellation carries no message.
    pub fn cancelled() -> Self {
        Self::new(ErrorType::TaskCancelled, "")
    }
}

/// Output stream of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Where a task's output lives inside the worker log files.
///
/// End offsets stay `None` while the task is still writing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLocations {
    pub stdout_file: Option<String>,
    pub stdout_start_offset: Option<u64>,
    pub stdout_end_offset: Option<u64>,
    pub stderr_file: Option<String>,
    pub stderr_start_offset: Option<u64>,
    pub stderr_end_offset: Option<u64>,
}

impl LogLocations {
    pub(crate) fn set_start(&mut self, stream: LogStream, file: String, offset: u64) {
        match stream {
            LogStream::Stdout => {
                self.stdout_file = Some(file);
                self.stdout_start_offset = Some(offset);
                self.stdout_end_offset = None;
            }
            LogStream::Stderr => {
                self.stderr_file = Some(file);
                self.stderr_start_offset = Some(offset);
                self.stderr_end_offset = None;
            }
        }
    }

    pub(crate) fn set_end(&mut self, stream: LogStream, offset: u64) {
        match stream {
            LogStream::Stdout => self.stdout_end_offset = Some(offset),
            LogStream::Stderr => self.stderr_end_offset = Some(offset),
        }
    }
}

/// Authoritative merged view of one task attempt.
///
/// Owned by the registry; callers only ever receive clones.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Id of the first attempt; shared by all retries of the same logical task.
    pub logical_task_id: TaskId,
    pub name: String,
    pub task_type: TaskType,
    pub state: TaskState,
    /// Task that logically created this one. Not an owning link.
    pub parent_task_id: Option<TaskId>,
    pub job_id: Option<JobId>,
    pub actor_id: Option<ActorId>,
    pub worker_id: Option<WorkerId>,
    pub node_id: Option<NodeId>,
    pub attempt_number: u32,
    pub creation_time_ms: u64,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub error: Option<ErrorInfo>,
    pub log_locations: Option<LogLocations>,
    pub profile_events: Vec<ProfileSpan>,
    /// Highest sequence number applied per producer.
    pub(crate) last_seq: HashMap<ProducerId, u64>,
    /// Set once an event has carried the task type.
    pub(crate) typed: bool,
}

impl TaskRecord {
    /// Creates a `PENDING` placeholder for a task first seen at `at_ms`.
    pub(crate) fn placeholder(id: TaskId, at_ms: u64) -> Self {
        Self {
            id,
            logical_task_id: id,
            name: String::new(),
            task_type: TaskType::NormalTask,
            state: TaskState::Pending,
            parent_task_id: None,
            job_id: None,
            actor_id: None,
            worker_id: None,
            node_id: None,
            attempt_number: 0,
            creation_time_ms: at_ms,
            start_time_ms: None,
            end_time_ms: None,
            error: None,
            log_locations: None,
            profile_events: Vec::new(),
            last_seq: HashMap::new(),
            typed: false,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Moves the record to `FAILED` unless it is already terminal.
    ///
    /// Returns `true` if the record changed.
    pub(crate) fn fail(&mut self, error: ErrorInfo, at_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TaskState::Failed;
        self.end_time_ms = Some(at_ms);
        self.error = Some(error);
        true
    }

    /// Moves the record to `FINISHED` unless it is already terminal.
    pub(crate) fn finish(&mut self, at_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = TaskState::Finished;
        self.start_time_ms.get_or_insert(at_ms);
        self.end_time_ms = Some(at_ms);
        self.error = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_do_not_advance() {
        for next in [
            TaskState::Pending,
            TaskState::Submitted,
            TaskState::Running,
            TaskState::Finished,
            TaskState::Failed,
        ] {
            assert!(!TaskState::Finished.can_advance_to(next));
            assert!(!TaskState::Failed.can_advance_to(next));
        }
    }

    #[test]
    fn skipping_forward_is_allowed() {
        assert!(TaskState::Pending.can_advance_to(TaskState::Finished));
        assert!(TaskState::Submitted.can_advance_to(TaskState::Failed));
    }

    #[test]
    fn self_transition_is_not_an_advance() {
        assert!(!TaskState::Running.can_advance_to(TaskState::Running));
    }

    #[test]
    fn fail_is_a_no_op_once_terminal() {
        let mut rec = TaskRecord::placeholder(TaskId::new(), 1);
        assert!(rec.finish(5));
        assert!(!rec.fail(ErrorInfo::new(ErrorType::WorkerDied, "late"), 6));
        assert_eq!(rec.state, TaskState::Finished);
        assert_eq!(rec.end_time_ms, Some(5));
        assert!(rec.error.is_none());
    }

    #[test]
    fn serde_names_match_query_names() {
        let json = serde_json::to_string(&ErrorType::TaskUnschedulableError).unwrap();
        assert_eq!(json, "\"TASK_UNSCHEDULABLE_ERROR\"");
        let json = serde_json::to_string(&TaskType::ActorCreationTask).unwrap();
        assert_eq!(json, format!("\"{}\"", TaskType::ActorCreationTask.as_str()));
    }
}
