//! # Ingestion gateway.
//!
//! Validates an [`EventBatch`], merges it into the registry under a single
//! write guard, runs fault propagation for whatever the batch failed, and only
//! then publishes notices and brings pending job sweeps up to date.
//!
//! ```text
//! EventBatch
//!   └─► validate range ──✗──► BatchRejected + IngestError
//!         │
//!         ├─► metrics: reported += len, dropped += carried drop counts
//!         ▼
//!   ┌──────────── write guard ────────────┐
//!   │ sort by seq → Registry::apply(..)   │
//!   │ Propagator: roots, actor deaths,    │
//!   │             late children           │
//!   └─────────────────────────────────────┘
//!         ▼
//!   metrics: stored += created/advanced
//!   bus: BatchIngested, TaskFailed, CascadeApplied, ActorDead
//!   reconciler.reconcile(jobs touched)
//! ```
//!
//! Readers never observe half a batch: the merge and its cascades share one guard.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::IngestError;
use crate::events::{Bus, EventBatch, EventType, Notice, NoticeKind, TaskEvent};
use crate::metrics::MetricsCounters;
use crate::model::now_ms;

use super::merge::{MergeEffects, MergeOutcome};
use super::propagate::Propagator;
use super::reconciler::Reconciler;
use super::registry::SharedRegistry;

/// Summary of one accepted batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Events carried by the batch.
    pub events: u64,
    /// Merges that created or advanced a record.
    pub stored: u64,
    /// Events rejected as stale duplicates.
    pub stale: u64,
    /// Tasks failed by the batch, directly or through cascades.
    pub tasks_failed: u64,
}

/// Entry point of producer batches into the registry.
pub(crate) struct Gateway {
    registry: SharedRegistry,
    metrics: Arc<MetricsCounters>,
    bus: Bus,
    reconciler: Arc<Reconciler>,
}

impl Gateway {
    pub(crate) fn new(
        registry: SharedRegistry,
        metrics: Arc<MetricsCounters>,
        bus: Bus,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            registry,
            metrics,
            bus,
            reconciler,
        }
    }

    pub(crate) fn ingest(&self, batch: &EventBatch) -> Result<IngestReport, IngestError> {
        if let Err(err) = validate(batch) {
            warn!(producer = %batch.producer_id, error = %err, "batch rejected");
            self.bus.publish(
                Notice::new(NoticeKind::BatchRejected)
                    .with_producer(batch.producer_id)
                    .with_reason(err.as_label()),
            );
            return Err(err);
        }

        self.metrics.add_reported(batch.len() as u64);
        self.account_drops(batch);

        let mut events: Vec<&TaskEvent> = batch.events.iter().collect();
        events.sort_by_key(|e| e.seq);

        let mut report = IngestReport {
            events: batch.len() as u64,
            ..IngestReport::default()
        };
        let mut fx = MergeEffects::default();
        let propagation = {
            let mut reg = self.registry.write();
            for event in events {
                match reg.apply(batch.producer_id, event, &mut fx) {
                    MergeOutcome::Stale => report.stale += 1,
                    outcome if outcome.is_stored() => report.stored += 1,
                    _ => {}
                }
            }

            let mut prop = Propagator::new(&mut reg, now_ms());
            for task in &fx.failed {
                prop.adopt_root(*task);
            }
            for (actor, reason) in fx.actors_dead.drain(..) {
                prop.kill_actor(actor, reason);
            }
            for parent in &fx.late_parents {
                prop.recascade(*parent);
            }
            prop.finish()
        };
        report.tasks_failed = propagation.tasks_failed();

        self.metrics.add_stored(report.stored);
        debug!(
            producer = %batch.producer_id,
            events = report.events,
            stored = report.stored,
            stale = report.stale,
            failed = report.tasks_failed,
            "batch ingested"
        );

        self.bus.publish(
            Notice::new(NoticeKind::BatchIngested)
                .with_producer(batch.producer_id)
                .with_count(report.events),
        );
        for notice in propagation.notices() {
            self.bus.publish(notice);
        }

        self.reconciler.reconcile(&fx.jobs);
        Ok(report)
    }

    fn account_drops(&self, batch: &EventBatch) {
        if batch.dropped.is_zero() {
            return;
        }
        self.metrics.add_drop_counts(batch.dropped);
        for ty in [EventType::StatusEvent, EventType::ProfileEvent] {
            let n = batch.dropped.get(ty);
            if n == 0 {
                continue;
            }
            warn!(producer = %batch.producer_id, event_type = %ty, dropped = n, "producer dropped events");
            self.bus.publish(
                Notice::new(NoticeKind::EventsDropped)
                    .with_producer(batch.producer_id)
                    .with_count(n)
                    .with_reason(ty.as_str()),
            );
        }
    }
}

fn validate(batch: &EventBatch) -> Result<(), IngestError> {
    let Some(range) = batch.range else {
        return if batch.is_empty() {
            Ok(())
        } else {
            Err(IngestError::MissingSequenceRange {
                events: batch.len(),
            })
        };
    };
    if range.first > range.last {
        return Err(IngestError::InvalidSequenceRange {
            first: range.first,
            last: range.last,
        });
    }
    match batch.events.iter().find(|e| !range.contains(e.seq)) {
        Some(e) => Err(IngestError::EventOutOfRange {
            seq: e.seq,
            first: range.first,
            last: range.last,
        }),
        None => Ok(()),
    }
}
