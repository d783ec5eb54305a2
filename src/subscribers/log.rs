//! # LogWriter: renders notices through `tracing`.
//!
//! Ingestion chatter goes to `debug`, failures and death signals to `info`,
//! drops, rejections and subscriber trouble to `warn`. The crate never installs
//! a global `tracing` subscriber; the host application decides where these land.
//!
//! ## Example output (with `tracing_subscriber::fmt`)
//! ```text
//! DEBUG batch ingested producer=Some(ProducerId(..)) count=Some(12)
//!  INFO task failed task=Some(TaskId(..)) reason=Some("TASK_EXECUTION_EXCEPTION")
//!  INFO cascade applied task=Some(TaskId(..)) count=Some(4)
//!  WARN events dropped producer=Some(ProducerId(..)) count=Some(3) reason=Some("PROFILE_EVENT")
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Notice, NoticeKind};
use crate::subscribers::Subscribe;

/// Notice writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_notice(&self, n: &Notice) {
        let reason = n.reason.as_deref();
        match n.kind {
            NoticeKind::BatchIngested => {
                debug!(seq = n.seq, producer = ?n.producer, count = ?n.count, "batch ingested");
            }
            NoticeKind::BatchRejected => {
                warn!(seq = n.seq, producer = ?n.producer, reason = ?reason, "batch rejected");
            }
            NoticeKind::EventsDropped => {
                warn!(seq = n.seq, producer = ?n.producer, count = ?n.count, reason = ?reason, "events dropped");
            }
            NoticeKind::TaskFailed => {
                info!(seq = n.seq, task = ?n.task, reason = ?reason, "task failed");
            }
            NoticeKind::CascadeApplied => {
                info!(seq = n.seq, task = ?n.task, count = ?n.count, "cascade applied");
            }
            NoticeKind::WorkerDied => {
                info!(seq = n.seq, worker = ?n.worker, count = ?n.count, reason = ?reason, "worker died");
            }
            NoticeKind::NodeDied => {
                info!(seq = n.seq, node = ?n.node, count = ?n.count, "node died");
            }
            NoticeKind::ActorDead => {
                info!(seq = n.seq, actor = ?n.actor, reason = ?reason, "actor dead");
            }
            NoticeKind::JobEnded => {
                info!(seq = n.seq, job = ?n.job, "job ended");
            }
            NoticeKind::JobReconciled => {
                info!(seq = n.seq, job = ?n.job, count = ?n.count, "job reconciled");
            }
            NoticeKind::ReconcileCancelled => {
                debug!(seq = n.seq, job = ?n.job, "reconcile cancelled");
            }
            NoticeKind::SubscriberOverflow => {
                warn!(seq = n.seq, reason = ?reason, "subscriber overflow");
            }
            NoticeKind::SubscriberPanicked => {
                warn!(seq = n.seq, reason = ?reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
