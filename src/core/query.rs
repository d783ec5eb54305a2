//! # Query engine: filtered listings over the registry.
//!
//! Listings are snapshots: the registry is read under its read guard, matching
//! records are projected into serializable views, and the guard is released
//! before the caller sees anything.
//!
//! ## Filters
//! Conjunctive `(field, =|!=, value)` triples, parsed from `"name=f"` or
//! `"state!=FAILED"`. Enum-valued fields (`state`, `type`, `error_type`)
//! compare case-insensitively; everything else compares exactly.
//!
//! ## Missing source
//! A [`QueryHandle`] only holds a weak reference to the registry. Once the
//! service is gone a listing either fails with
//! [`QueryError::SourceUnavailable`] (`raise_on_missing_output`) or returns an
//! empty listing flagged `partial`.
//!
//! ## Example
//! ```rust
//! use tasklineage::{Filter, FilterOp};
//!
//! let f: Filter = "state!=FAILED".parse().unwrap();
//! assert_eq!(f.field, "state");
//! assert_eq!(f.op, FilterOp::Ne);
//! assert_eq!(f.value, "FAILED");
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Weak;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::QueryError;
use crate::events::ProfileSpan;
use crate::model::{
    ActorId, ActorRecord, ActorState, ErrorType, JobId, LogLocations, NodeId, TaskId, TaskRecord,
    TaskState, TaskType, WorkerId,
};

use super::registry::Registry;

/// Queryable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Tasks,
    Actors,
}

impl Resource {
    /// Field names accepted in filters for this resource.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Resource::Tasks => TASK_FIELDS,
            Resource::Actors => ACTOR_FIELDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Tasks => "tasks",
            Resource::Actors => "actors",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TASK_FIELDS: &[&str] = &[
    "task_id",
    "name",
    "state",
    "type",
    "task_type",
    "job_id",
    "actor_id",
    "parent_task_id",
    "attempt_number",
    "error_type",
    "worker_id",
    "node_id",
    "logical_task_id",
];

const ACTOR_FIELDS: &[&str] = &[
    "actor_id",
    "class_name",
    "state",
    "job_id",
    "creation_task_id",
    "num_restarts",
];

const CASE_INSENSITIVE: &[&str] = &["state", "type", "task_type", "error_type"];

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// One `(field, op, value)` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Ne,
            value: value.into(),
        }
    }

    fn matches(&self, actual: &str) -> bool {
        let equal = if CASE_INSENSITIVE.contains(&self.field.as_str()) {
            actual.eq_ignore_ascii_case(&self.value)
        } else {
            actual == self.value
        };
        match self.op {
            FilterOp::Eq => equal,
            FilterOp::Ne => !equal,
        }
    }
}

impl FromStr for Filter {
    type Err = QueryError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = || QueryError::InvalidFilter {
            expr: expr.to_owned(),
        };
        let (field, op, value) = match expr.split_once("!=") {
            Some((field, value)) => (field, FilterOp::Ne, value),
            None => {
                let (field, value) = expr.split_once('=').ok_or_else(invalid)?;
                (field, FilterOp::Eq, value)
            }
        };
        let field = field.trim();
        if field.is_empty() || field.contains(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self {
            field: field.to_owned(),
            op,
            value: value.trim().to_owned(),
        })
    }
}

/// Listing options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    /// Maximum rows returned (`0` = unlimited).
    pub limit: usize,
    /// Include large fields (messages, timestamps, logs, profiling).
    pub detail: bool,
    /// Skip `DRIVER_TASK` records.
    pub exclude_driver: bool,
    /// Fail instead of returning a partial listing when the source is gone.
    pub raise_on_missing_output: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            detail: false,
            exclude_driver: false,
            raise_on_missing_output: false,
        }
    }
}

impl ListOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_detail(mut self) -> Self {
        self.detail = true;
        self
    }

    pub fn excluding_driver(mut self) -> Self {
        self.exclude_driver = true;
        self
    }

    pub fn raising_on_missing_output(mut self) -> Self {
        self.raise_on_missing_output = true;
        self
    }
}

/// Task row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub name: String,
    pub state: TaskState,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub job_id: Option<JobId>,
    pub actor_id: Option<ActorId>,
    pub parent_task_id: Option<TaskId>,
    pub attempt_number: u32,
    pub error_type: Option<ErrorType>,
    #[serde(flatten)]
    pub detail: Option<TaskDetail>,
}

/// Large task fields, present with `detail`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDetail {
    pub logical_task_id: TaskId,
    pub error_message: Option<String>,
    pub creation_time_ms: u64,
    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub worker_id: Option<WorkerId>,
    pub node_id: Option<NodeId>,
    pub task_log_info: Option<LogLocations>,
    pub profile_events: Vec<ProfileSpan>,
}

impl TaskView {
    fn project(rec: &TaskRecord, detail: bool) -> Self {
        Self {
            task_id: rec.id,
            name: rec.name.clone(),
            state: rec.state,
            task_type: rec.task_type,
            job_id: rec.job_id,
            actor_id: rec.actor_id,
            parent_task_id: rec.parent_task_id,
            attempt_number: rec.attempt_number,
            error_type: rec.error.as_ref().map(|e| e.error_type),
            detail: detail.then(|| TaskDetail {
                logical_task_id: rec.logical_task_id,
                error_message: rec.error.as_ref().map(|e| e.error_message.clone()),
                creation_time_ms: rec.creation_time_ms,
                start_time_ms: rec.start_time_ms,
                end_time_ms: rec.end_time_ms,
                worker_id: rec.worker_id,
                node_id: rec.node_id,
                task_log_info: rec.log_locations.clone(),
                profile_events: rec.profile_events.clone(),
            }),
        }
    }

    /// Error message, available only on detailed rows.
    pub fn error_message(&self) -> Option<&str> {
        self.detail.as_ref()?.error_message.as_deref()
    }
}

/// Actor row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorView {
    pub actor_id: ActorId,
    pub class_name: String,
    pub state: ActorState,
    pub job_id: Option<JobId>,
    pub creation_task_id: TaskId,
    #[serde(flatten)]
    pub detail: Option<ActorDetail>,
}

/// Large actor fields, present with `detail`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorDetail {
    pub death_cause: Option<String>,
    pub num_restarts: u32,
    pub incarnation: u32,
}

impl ActorView {
    fn project(rec: &ActorRecord, detail: bool) -> Self {
        Self {
            actor_id: rec.id,
            class_name: rec.class_name.clone(),
            state: rec.state,
            job_id: rec.job_id,
            creation_task_id: rec.creation_task_id,
            detail: detail.then(|| ActorDetail {
                death_cause: rec.death_cause.clone(),
                num_restarts: rec.num_restarts,
                incarnation: rec.incarnation,
            }),
        }
    }
}

/// One listing row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Task(TaskView),
    Actor(ActorView),
}

impl Row {
    pub fn as_task(&self) -> Option<&TaskView> {
        match self {
            Row::Task(t) => Some(t),
            Row::Actor(_) => None,
        }
    }

    pub fn as_actor(&self) -> Option<&ActorView> {
        match self {
            Row::Actor(a) => Some(a),
            Row::Task(_) => None,
        }
    }
}

/// Result of [`QueryHandle::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub resource: Resource,
    /// Rows in insertion order, truncated to the limit.
    pub rows: Vec<Row>,
    /// Matching rows before truncation.
    pub total: usize,
    /// `true` when the data source was unavailable.
    pub partial: bool,
}

impl Listing {
    fn empty(resource: Resource, partial: bool) -> Self {
        Self {
            resource,
            rows: Vec::new(),
            total: 0,
            partial,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Task rows of this listing.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskView> {
        self.rows.iter().filter_map(Row::as_task)
    }

    /// Actor rows of this listing.
    pub fn actors(&self) -> impl Iterator<Item = &ActorView> {
        self.rows.iter().filter_map(Row::as_actor)
    }
}

/// Read-only handle on the registry, detachable from the service.
#[derive(Clone, Debug)]
pub struct QueryHandle {
    source: Weak<RwLock<Registry>>,
}

impl QueryHandle {
    pub(crate) fn new(source: Weak<RwLock<Registry>>) -> Self {
        Self { source }
    }

    /// Lists `resource` rows matching every filter.
    pub fn list(
        &self,
        resource: Resource,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Listing, QueryError> {
        let allowed = resource.fields();
        if let Some(bad) = filters.iter().find(|f| !allowed.contains(&f.field.as_str())) {
            return Err(QueryError::UnknownField {
                resource,
                field: bad.field.clone(),
            });
        }

        let Some(source) = self.source.upgrade() else {
            if opts.raise_on_missing_output {
                return Err(QueryError::SourceUnavailable { resource });
            }
            return Ok(Listing::empty(resource, true));
        };
        let reg = source.read();

        let limit = if opts.limit == 0 { usize::MAX } else { opts.limit };
        let mut rows = Vec::new();
        let mut total = 0;
        match resource {
            Resource::Tasks => {
                let matching = reg
                    .tasks_in_order()
                    .filter(|t| !(opts.exclude_driver && t.task_type == TaskType::DriverTask))
                    .filter(|t| filters.iter().all(|f| f.matches(&task_field(t, &f.field))));
                for rec in matching {
                    total += 1;
                    if rows.len() < limit {
                        rows.push(Row::Task(TaskView::project(rec, opts.detail)));
                    }
                }
            }
            Resource::Actors => {
                let matching = reg
                    .actors_in_order()
                    .filter(|a| filters.iter().all(|f| f.matches(&actor_field(a, &f.field))));
                for rec in matching {
                    total += 1;
                    if rows.len() < limit {
                        rows.push(Row::Actor(ActorView::project(rec, opts.detail)));
                    }
                }
            }
        }

        Ok(Listing {
            resource,
            rows,
            total,
            partial: false,
        })
    }

    /// Typed shortcut for task listings.
    ///
    /// A plain `Vec` cannot carry [`Listing::partial`], so a missing source is
    /// always [`QueryError::SourceUnavailable`] here, whatever
    /// `raise_on_missing_output` says.
    pub fn list_tasks(
        &self,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Vec<TaskView>, QueryError> {
        let listing = self.list(Resource::Tasks, filters, &strict(opts))?;
        Ok(listing.tasks().cloned().collect())
    }

    /// Typed shortcut for actor listings. Like [`QueryHandle::list_tasks`], a
    /// missing source is always an error.
    pub fn list_actors(
        &self,
        filters: &[Filter],
        opts: &ListOptions,
    ) -> Result<Vec<ActorView>, QueryError> {
        let listing = self.list(Resource::Actors, filters, &strict(opts))?;
        Ok(listing.actors().cloned().collect())
    }
}

fn strict(opts: &ListOptions) -> ListOptions {
    ListOptions {
        raise_on_missing_output: true,
        ..opts.clone()
    }
}

fn opt_string<T: ToString>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn task_field(rec: &TaskRecord, field: &str) -> String {
    match field {
        "task_id" => rec.id.to_string(),
        "name" => rec.name.clone(),
        "state" => rec.state.as_str().to_owned(),
        "type" | "task_type" => rec.task_type.as_str().to_owned(),
        "job_id" => opt_string(rec.job_id),
        "actor_id" => opt_string(rec.actor_id),
        "parent_task_id" => opt_string(rec.parent_task_id),
        "attempt_number" => rec.attempt_number.to_string(),
        "error_type" => opt_string(rec.error.as_ref().map(|e| e.error_type.as_str())),
        "worker_id" => opt_string(rec.worker_id),
        "node_id" => opt_string(rec.node_id),
        "logical_task_id" => rec.logical_task_id.to_string(),
        _ => String::new(),
    }
}

fn actor_field(rec: &ActorRecord, field: &str) -> String {
    match field {
        "actor_id" => rec.id.to_string(),
        "class_name" => rec.class_name.clone(),
        "state" => rec.state.as_str().to_owned(),
        "job_id" => opt_string(rec.job_id),
        "creation_task_id" => rec.creation_task_id.to_string(),
        "num_restarts" => rec.num_restarts.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::Config;
    use crate::core::merge::MergeEffects;
    use crate::events::{StatusUpdate, TaskEvent};
    use crate::model::ProducerId;

    fn seeded() -> (Arc<RwLock<Registry>>, QueryHandle) {
        let reg = Registry::shared(&Config::default());
        let producer = ProducerId::new();
        let updates = [
            StatusUpdate::new(TaskState::Finished).with_name("f"),
            StatusUpdate::new(TaskState::Running).with_name("g"),
            StatusUpdate::new(TaskState::Running)
                .with_name("main")
                .with_task_type(TaskType::DriverTask),
        ];
        for (seq, update) in updates.into_iter().enumerate() {
            let ev = TaskEvent::status(TaskId::new(), seq as u64 + 1, 1, update);
            reg.write().apply(producer, &ev, &mut MergeEffects::default());
        }
        let handle = QueryHandle::new(Arc::downgrade(&reg));
        (reg, handle)
    }

    #[test]
    fn filter_parsing() {
        assert_eq!("name=f".parse::<Filter>().unwrap(), Filter::eq("name", "f"));
        assert_eq!(
            " state != FAILED ".parse::<Filter>().unwrap(),
            Filter::ne("state", "FAILED")
        );
        assert!(matches!(
            "no operator".parse::<Filter>(),
            Err(QueryError::InvalidFilter { .. })
        ));
        assert!(matches!(
            "=value".parse::<Filter>(),
            Err(QueryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn name_filter_selects_one_row() {
        let (_reg, q) = seeded();
        let rows = q
            .list_tasks(&[Filter::eq("name", "f")], &ListOptions::default())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, TaskState::Finished);
        assert!(rows[0].detail.is_none());
    }

    #[test]
    fn state_filter_is_case_insensitive() {
        let (_reg, q) = seeded();
        let listing = q
            .list(Resource::Tasks, &[Filter::eq("state", "running")], &ListOptions::default())
            .unwrap();
        assert_eq!(listing.total, 2);
    }

    #[test]
    fn exclude_driver_and_limit() {
        let (_reg, q) = seeded();
        let opts = ListOptions::default().excluding_driver().with_limit(1);
        let listing = q.list(Resource::Tasks, &[], &opts).unwrap();
        assert_eq!(listing.total, 2);
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.tasks().next().unwrap().name, "f");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let (_reg, q) = seeded();
        let err = q
            .list(Resource::Actors, &[Filter::eq("name", "x")], &ListOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::UnknownField {
                resource: Resource::Actors,
                field: "name".into()
            }
        );
    }

    #[test]
    fn missing_source_is_partial_or_error() {
        let (reg, q) = seeded();
        drop(reg);

        let listing = q
            .list(Resource::Tasks, &[], &ListOptions::default())
            .unwrap();
        assert!(listing.partial);
        assert!(listing.is_empty());

        let err = q
            .list(
                Resource::Tasks,
                &[],
                &ListOptions::default().raising_on_missing_output(),
            )
            .unwrap_err();
        assert_eq!(err.as_label(), "query_source_unavailable");

        let typed = q.list_tasks(&[], &ListOptions::default());
        assert!(matches!(typed, Err(QueryError::SourceUnavailable { .. })));
        let typed = q.list_actors(&[], &ListOptions::default());
        assert!(matches!(typed, Err(QueryError::SourceUnavailable { .. })));
    }

    #[test]
    fn detailed_rows_serialize_flat() {
        let (_reg, q) = seeded();
        let rows = q
            .list_tasks(&[Filter::eq("name", "f")], &ListOptions::default().with_detail())
            .unwrap();
        let json = serde_json::to_value(&rows[0]).unwrap();
        assert_eq!(json["type"], "NORMAL_TASK");
        assert_eq!(json["state"], "FINISHED");
        assert!(json.get("end_time_ms").is_some());
        assert!(json["task_log_info"].is_null());
    }
}
