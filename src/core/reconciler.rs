//! # Job reconciler: finalizes tasks left behind by finished jobs.
//!
//! When a job ends, its producers may die before flushing the final status of
//! their tasks. [`Reconciler::schedule`] arms a sweep due one grace delay after
//! the job ended; on firing, every task of the job that is still non-terminal
//! is failed with `WORKER_DIED` and its descendants cascade.
//!
//! ```text
//! schedule(job) ─► deadline = now + grace ─► arm ─┬─ sleep_until(deadline) ─► sweep(job) ─► JobReconciled
//!                                                 └─ token.cancelled()  (settled early / shutdown)
//!
//! reconcile(jobs touched by a batch)
//!   ├─ armed, every task terminal          ──► disarm (deadline kept) ─► ReconcileCancelled
//!   └─ finished, live task, not armed      ──► re-arm for the same deadline
//!                                              (deadline passed ─► sweep now)
//! ```
//!
//! ## Rules
//! - At most one armed sweep per job; re-scheduling replaces it.
//! - A disarmed job keeps its deadline, so a task reported late is still
//!   failed within the grace delay of the job's end.
//! - A zero grace delay (or no async runtime) sweeps synchronously.
//! - Shutdown cancels every pending sweep without firing it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::events::{Bus, Notice, NoticeKind};
use crate::model::{JobId, now_ms};

use super::propagate::Propagator;
use super::registry::SharedRegistry;

/// Sweep bookkeeping of one ended job.
struct Sweep {
    generation: u64,
    deadline: Instant,
    /// `None` once the job settled before the deadline.
    token: Option<CancellationToken>,
}

/// Deferred per-job sweeps.
pub(crate) struct Reconciler {
    registry: SharedRegistry,
    bus: Bus,
    grace: Option<Duration>,
    sweeps: Mutex<HashMap<JobId, Sweep>>,
    generation: AtomicU64,
    token: CancellationToken,
}

impl Reconciler {
    pub(crate) fn new(
        registry: SharedRegistry,
        bus: Bus,
        grace: Option<Duration>,
        token: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            bus,
            grace,
            sweeps: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            token,
        })
    }

    /// Arms the sweep of `job` one grace delay from now.
    pub(crate) fn schedule(self: &Arc<Self>, job: JobId) {
        let Some(grace) = self.grace else {
            self.sweep(job);
            return;
        };
        debug!(%job, ?grace, "reconcile sweep scheduled");
        self.arm(job, Instant::now() + grace);
    }

    fn arm(self: &Arc<Self>, job: JobId, deadline: Instant) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.sweep(job);
            return;
        };
        if self.token.is_cancelled() {
            return;
        }

        let child = self.token.child_token();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.sweeps.lock().insert(
            job,
            Sweep {
                generation,
                deadline,
                token: Some(child.clone()),
            },
        );
        if let Some(token) = previous.and_then(|s| s.token) {
            token.cancel();
        }

        let me = Arc::clone(self);
        handle.spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = time::sleep_until(deadline) => {
                    let ours = {
                        let mut sweeps = me.sweeps.lock();
                        let ours = sweeps.get(&job).is_some_and(|s| s.generation == generation);
                        if ours {
                            sweeps.remove(&job);
                        }
                        ours
                    };
                    if ours {
                        me.sweep(job);
                    }
                }
            }
        });
    }

    /// Fails the live tasks of `job`. Returns tasks failed.
    pub(crate) fn sweep(&self, job: JobId) -> u64 {
        let (swept, report) = {
            let mut reg = self.registry.write();
            let mut prop = Propagator::new(&mut reg, now_ms());
            let swept = prop.sweep_job(job);
            (swept, prop.finish())
        };

        info!(%job, swept, cascaded = report.tasks_failed().saturating_sub(swept), "job reconciled");
        for notice in report.notices() {
            self.bus.publish(notice);
        }
        self.bus.publish(
            Notice::new(NoticeKind::JobReconciled)
                .with_job(job)
                .with_count(swept),
        );
        swept
    }

    /// Brings the sweeps of `jobs` in line with their tasks after a merge.
    ///
    /// Armed jobs whose tasks are all terminal are disarmed; finished jobs that
    /// gained a live task are re-armed for their original deadline, or swept
    /// right away once it has passed.
    pub(crate) fn reconcile(self: &Arc<Self>, jobs: &[JobId]) {
        self.settle(jobs);
        if self.token.is_cancelled() {
            return;
        }
        for job in jobs {
            let orphaned = {
                let reg = self.registry.read();
                reg.job(job).is_some_and(|j| j.is_finished) && !reg.live_tasks_of_job(job).is_empty()
            };
            if !orphaned {
                continue;
            }
            let deadline = match self.sweeps.lock().get(job) {
                Some(s) if s.token.is_some() => continue,
                Some(s) => Some(s.deadline),
                None => None,
            };
            match deadline {
                Some(deadline) if deadline > Instant::now() => {
                    debug!(%job, "reconcile sweep re-armed: late task of finished job");
                    self.arm(*job, deadline);
                }
                _ => {
                    self.sweeps.lock().remove(job);
                    self.sweep(*job);
                }
            }
        }
    }

    /// Disarms the sweeps of `jobs` whose tasks are all terminal.
    pub(crate) fn settle(&self, jobs: &[JobId]) {
        let mut sweeps = self.sweeps.lock();
        if sweeps.is_empty() {
            return;
        }
        let now = Instant::now();
        for job in jobs {
            let Some(sweep) = sweeps.get_mut(job) else {
                continue;
            };
            if sweep.token.is_none() {
                continue;
            }
            if !self.registry.read().live_tasks_of_job(job).is_empty() {
                continue;
            }
            if let Some(token) = sweep.token.take() {
                token.cancel();
            }
            debug!(%job, "reconcile sweep cancelled: job settled");
            self.bus
                .publish(Notice::new(NoticeKind::ReconcileCancelled).with_job(*job));
        }
        sweeps.retain(|_, s| s.token.is_some() || s.deadline > now);
    }

    /// Re-checks every armed sweep.
    pub(crate) fn settle_all(&self) {
        let jobs: Vec<JobId> = self.sweeps.lock().keys().copied().collect();
        self.settle(&jobs);
    }

    /// Number of sweeps still armed.
    pub(crate) fn pending(&self) -> usize {
        self.sweeps
            .lock()
            .values()
            .filter(|s| s.token.is_some())
            .count()
    }

    /// Cancels every pending sweep.
    pub(crate) fn shutdown(&self) {
        self.token.cancel();
        self.sweeps.lock().clear();
    }
}
