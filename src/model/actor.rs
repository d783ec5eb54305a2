//! # Actor records.
//!
//! An actor holds a one-way link to the task that created it. The creation task
//! has no back-pointer; it only carries the actor id as an opaque value.
//!
//! ```text
//! PENDING ──► ALIVE ──► RESTARTING ──► ALIVE ...
//!    │          │            │
//!    └──────────┴────────────┴──► DEAD   (at most once per incarnation)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{ActorId, JobId, TaskId};

/// Lifecycle state of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorState {
    Pending,
    Alive,
    Restarting,
    Dead,
}

impl ActorState {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorState::Pending => "PENDING",
            ActorState::Alive => "ALIVE",
            ActorState::Restarting => "RESTARTING",
            ActorState::Dead => "DEAD",
        }
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative view of one actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
    pub id: ActorId,
    pub class_name: String,
    pub state: ActorState,
    /// Creation task of the current incarnation.
    pub creation_task_id: TaskId,
    pub job_id: Option<JobId>,
    /// Reason recorded when the actor died.
    pub death_cause: Option<String>,
    pub num_restarts: u32,
    /// Incremented on every restart; `mark_dead` applies once per value.
    pub incarnation: u32,
}

impl ActorRecord {
    pub(crate) fn new(
        id: ActorId,
        creation_task_id: TaskId,
        class_name: String,
        job_id: Option<JobId>,
    ) -> Self {
        Self {
            id,
            class_name,
            state: ActorState::Pending,
            creation_task_id,
            job_id,
            death_cause: None,
            num_restarts: 0,
            incarnation: 0,
        }
    }

    #[inline]
    pub fn is_dead(&self) -> bool {
        self.state == ActorState::Dead
    }
}
