//! # Bounded producer-side event buffer.
//!
//! Status events and profiling events are kept in separate queues sharing one
//! capacity, so eviction can prefer the cheap class without scanning:
//!
//! ```text
//! record(event), buffer full?
//!   ├─ profile event  ──► dropped                          (PROFILE_EVENT += 1)
//!   └─ status event   ──► evict oldest profile event       (PROFILE_EVENT += 1)
//!                         or, if none, oldest status event (STATUS_EVENT  += 1)
//! ```
//!
//! Every drop is counted twice: in the producer's own [`MetricsCounters`] and in
//! a pending [`DropCounts`] that travels with the next flushed batch.
//!
//! `record` never blocks on I/O; the internal lock is held only for the push.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::Config;
use crate::events::{DropCounts, EventType, TaskEvent};
use crate::metrics::MetricsCounters;

#[derive(Default)]
struct Queues {
    status: VecDeque<TaskEvent>,
    profile: VecDeque<TaskEvent>,
    dropped: DropCounts,
}

impl Queues {
    fn len(&self) -> usize {
        self.status.len() + self.profile.len()
    }

    fn queue_for(&mut self, event: &TaskEvent) -> &mut VecDeque<TaskEvent> {
        if event.is_status() {
            &mut self.status
        } else {
            &mut self.profile
        }
    }

    /// Evicts one event to make room for a status event.
    fn evict_for_status(&mut self) -> Option<EventType> {
        if self.profile.pop_front().is_some() {
            Some(EventType::ProfileEvent)
        } else if self.status.pop_front().is_some() {
            Some(EventType::StatusEvent)
        } else {
            None
        }
    }
}

/// Outcome of [`EventBuffer::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Buffered without evicting anything.
    Buffered,
    /// Buffered after evicting an older event of the given type.
    Evicted(EventType),
    /// The incoming event was dropped (buffer full).
    Dropped,
    /// Profiling is disabled; the event was never accepted.
    Disabled,
}

impl Recorded {
    /// `true` if the incoming event is now buffered.
    pub fn is_buffered(self) -> bool {
        matches!(self, Recorded::Buffered | Recorded::Evicted(_))
    }
}

/// Bounded, drop-counting event buffer of one producer.
pub struct EventBuffer {
    queues: Mutex<Queues>,
    capacity: Option<usize>,
    profile_enabled: bool,
    metrics: Arc<MetricsCounters>,
}

impl EventBuffer {
    pub fn new(cfg: &Config, metrics: Arc<MetricsCounters>) -> Self {
        Self::with_capacity(cfg.buffer_capacity(), cfg.profile_events_enabled, metrics)
    }

    /// `capacity = None` means unbounded.
    pub fn with_capacity(
        capacity: Option<usize>,
        profile_enabled: bool,
        metrics: Arc<MetricsCounters>,
    ) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            capacity: capacity.map(|c| c.max(1)),
            profile_enabled,
            metrics,
        }
    }

    /// Buffers one event, applying the drop policy when full.
    pub fn record(&self, event: TaskEvent) -> Recorded {
        if !event.is_status() && !self.profile_enabled {
            return Recorded::Disabled;
        }

        let mut q = self.queues.lock();
        let mut outcome = Recorded::Buffered;
        if self.capacity.is_some_and(|cap| q.len() >= cap) {
            if !event.is_status() {
                q.dropped.bump(EventType::ProfileEvent);
                self.metrics.add_dropped(EventType::ProfileEvent, 1);
                return Recorded::Dropped;
            }
            if let Some(evicted) = q.evict_for_status() {
                q.dropped.bump(evicted);
                self.metrics.add_dropped(evicted, 1);
                outcome = Recorded::Evicted(evicted);
            }
        }
        q.queue_for(&event).push_back(event);
        outcome
    }

    /// Drains every buffered event (ordered by sequence number) and the drop
    /// counts accumulated since the previous flush.
    pub fn flush(&self) -> (Vec<TaskEvent>, DropCounts) {
        let (status, profile, dropped) = {
            let mut q = self.queues.lock();
            (
                std::mem::take(&mut q.status),
                std::mem::take(&mut q.profile),
                std::mem::take(&mut q.dropped),
            )
        };
        let mut events: Vec<TaskEvent> = status.into_iter().chain(profile).collect();
        events.sort_by_key(|e| e.seq);
        (events, dropped)
    }

    /// Puts back events and drop counts of a batch that could not be delivered.
    ///
    /// Requeued events are older than anything recorded since the flush, so
    /// they go to the front; the drop policy then trims any overflow.
    pub fn requeue(&self, events: Vec<TaskEvent>, dropped: DropCounts) {
        let mut q = self.queues.lock();
        q.dropped.absorb(dropped);
        for event in events.into_iter().rev() {
            q.queue_for(&event).push_front(event);
        }
        if let Some(cap) = self.capacity {
            while q.len() > cap {
                let evicted = if q.profile.pop_front().is_some() {
                    EventType::ProfileEvent
                } else if q.status.pop_front().is_some() {
                    EventType::StatusEvent
                } else {
                    break;
                };
                q.dropped.bump(evicted);
                self.metrics.add_dropped(evicted, 1);
            }
        }
    }

    /// Counts events that will never be delivered as drops.
    pub fn discard(&self, events: &[TaskEvent], dropped: DropCounts) {
        let mut q = self.queues.lock();
        q.dropped.absorb(dropped);
        for event in events {
            q.dropped.bump(event.event_type());
            self.metrics.add_dropped(event.event_type(), 1);
        }
    }

    pub fn len(&self) -> usize {
        self.queues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop counts not yet shipped with a batch.
    pub fn pending_drops(&self) -> DropCounts {
        self.queues.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProfileSpan, StatusUpdate};
    use crate::model::{TaskId, TaskState};

    fn status(seq: u64) -> TaskEvent {
        TaskEvent::status(TaskId::new(), seq, seq, StatusUpdate::new(TaskState::Pending))
    }

    fn profile(seq: u64) -> TaskEvent {
        TaskEvent::profile(TaskId::new(), seq, ProfileSpan::new("worker", "exec", seq, seq))
    }

    fn buffer(cap: usize) -> (EventBuffer, Arc<MetricsCounters>) {
        let metrics = Arc::new(MetricsCounters::new());
        (EventBuffer::with_capacity(Some(cap), true, Arc::clone(&metrics)), metrics)
    }

    #[test]
    fn status_events_evict_profile_events_first() {
        let (buf, metrics) = buffer(3);
        buf.record(profile(1));
        buf.record(status(2));
        buf.record(profile(3));

        assert_eq!(buf.record(status(4)), Recorded::Evicted(EventType::ProfileEvent));
        assert_eq!(buf.record(status(5)), Recorded::Evicted(EventType::ProfileEvent));
        assert_eq!(buf.record(status(6)), Recorded::Evicted(EventType::StatusEvent));

        let (events, dropped) = buf.flush();
        let seqs: Vec<_> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![4, 5, 6]);
        assert_eq!(dropped, DropCounts { status: 1, profile: 2 });
        assert_eq!(metrics.dropped(EventType::ProfileEvent), 2);
        assert_eq!(metrics.dropped(EventType::StatusEvent), 1);
    }

    #[test]
    fn incoming_profile_event_is_dropped_when_full() {
        let (buf, _metrics) = buffer(1);
        buf.record(status(1));
        assert_eq!(buf.record(profile(2)), Recorded::Dropped);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.pending_drops().profile, 1);
    }

    #[test]
    fn disabled_profiling_is_not_counted_as_drop() {
        let metrics = Arc::new(MetricsCounters::new());
        let buf = EventBuffer::with_capacity(None, false, Arc::clone(&metrics));
        assert_eq!(buf.record(profile(1)), Recorded::Disabled);
        assert!(buf.is_empty());
        assert_eq!(metrics.dropped(EventType::ProfileEvent), 0);
    }

    #[test]
    fn flush_resets_drop_counts_and_requeue_restores_them() {
        let (buf, _metrics) = buffer(1);
        buf.record(status(1));
        buf.record(profile(2));
        let (events, dropped) = buf.flush();
        assert!(buf.pending_drops().is_zero());

        buf.record(status(3));
        buf.requeue(events, dropped);
        // Capacity 1: the requeued (older) status event is trimmed.
        let (events, dropped) = buf.flush();
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![3]);
        assert_eq!(dropped, DropCounts { status: 1, profile: 1 });
    }
}
