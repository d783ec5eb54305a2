//! Central service: registry, merge, propagation, ingestion, queries, reconciliation.
//!
//! The public API of this module is [`StateService`] (built via
//! [`ServiceBuilder`]), its [`Config`], and the query types.
//!
//! Internal modules:
//! - [`registry`]: task/actor/job records behind one `RwLock`;
//! - [`merge`]: folds task events into records (forward-only, idempotent);
//! - [`propagate`]: death signals and cascading failures;
//! - [`gateway`]: batch validation, merge, propagation, notices;
//! - [`query`]: filtered snapshot listings;
//! - [`reconciler`]: deferred sweep of finished jobs.

mod builder;
mod config;
mod gateway;
mod merge;
mod propagate;
mod query;
mod reconciler;
mod registry;
mod service;

pub use builder::ServiceBuilder;
pub use config::Config;
pub use gateway::IngestReport;
pub use query::{
    ActorDetail, ActorView, Filter, FilterOp, ListOptions, Listing, QueryHandle, Resource, Row,
    TaskDetail, TaskView,
};
pub use service::StateService;
