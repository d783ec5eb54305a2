//! # Process-scoped event counters.
//!
//! [`MetricsCounters`] is created explicitly at service (or producer) start and
//! handed to the components that update it; there is no global instance.
//! Exposition is left to an external exporter that reads [`MetricsCounters::snapshot`].
//!
//! | Counter           | Updated by                      | Meaning                                   |
//! |-------------------|---------------------------------|-------------------------------------------|
//! | `reported`        | ingestion gateway               | events received in batches                |
//! | `stored`          | ingestion gateway               | records created or advanced by a merge    |
//! | `dropped_by_type` | event buffer / gateway          | events dropped before reaching the registry |

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::events::{DropCounts, EventType};

/// Monotonic counters; reset only by creating a new instance.
#[derive(Debug, Default)]
pub struct MetricsCounters {
    reported: AtomicU64,
    stored: AtomicU64,
    dropped_status: AtomicU64,
    dropped_profile: AtomicU64,
}

impl MetricsCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reported(&self, n: u64) {
        self.reported.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_stored(&self, n: u64) {
        self.stored.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_dropped(&self, ty: EventType, n: u64) {
        let counter = match ty {
            EventType::StatusEvent => &self.dropped_status,
            EventType::ProfileEvent => &self.dropped_profile,
        };
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_drop_counts(&self, counts: DropCounts) {
        self.add_dropped(EventType::StatusEvent, counts.status);
        self.add_dropped(EventType::ProfileEvent, counts.profile);
    }

    pub fn reported(&self) -> u64 {
        self.reported.load(Ordering::Relaxed)
    }

    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    pub fn dropped(&self, ty: EventType) -> u64 {
        match ty {
            EventType::StatusEvent => self.dropped_status.load(Ordering::Relaxed),
            EventType::ProfileEvent => self.dropped_profile.load(Ordering::Relaxed),
        }
    }

    /// Reads all counters at once.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut dropped_by_type = BTreeMap::new();
        for ty in [EventType::StatusEvent, EventType::ProfileEvent] {
            dropped_by_type.insert(ty, self.dropped(ty));
        }
        MetricsSnapshot {
            reported: self.reported(),
            stored: self.stored(),
            dropped_by_type,
        }
    }
}

/// Point-in-time copy of [`MetricsCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub reported: u64,
    pub stored: u64,
    pub dropped_by_type: BTreeMap<EventType, u64>,
}

impl MetricsSnapshot {
    pub fn dropped(&self, ty: EventType) -> u64 {
        self.dropped_by_type.get(&ty).copied().unwrap_or(0)
    }
}
