use super::ids::{JobId, TaskId};

/// Lifecycle of one job.
///
/// Created on job start (or implicitly by the first task referencing it).
/// A finished job keeps its record so tasks reported after the end are still
/// attributed to a finished job and reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub id: JobId,
    pub is_finished: bool,
    pub start_time_ms: u64,
    pub end_time_ms: Option<u64>,
    pub driver_task_id: Option<TaskId>,
}

impl JobRecord {
    pub(crate) fn new(id: JobId, start_time_ms: u64) -> Self {
        Self {
            id,
            is_finished: false,
            start_time_ms,
            end_time_ms: None,
            driver_task_id: None,
        }
    }
}
