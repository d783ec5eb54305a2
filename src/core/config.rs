//! # Service and producer configuration.
//!
//! [`Config`] centralizes every tunable of the tracking service and of the
//! producer-side buffer/reporter. Thresholds are injected here, never hardcoded
//! in the components.
//!
//! ## Sentinel values
//! - `max_buffered_events = 0` → unbounded producer buffer
//! - `max_profile_events_per_task = 0` → unbounded profile history per task
//! - `job_grace_delay = 0s` → sweep a finished job's tasks immediately

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Configuration shared by the service and its producers.
///
/// ## Field semantics
/// - `flush_interval`: period of the producer flush loop
/// - `max_buffered_events`: producer buffer cap (`0` = unbounded)
/// - `profile_events_enabled`: whether producers accept profiling events at all
/// - `max_profile_events_per_task`: profile spans kept per task (`0` = unbounded)
/// - `job_grace_delay`: wait between job end and the reconciliation sweep
/// - `bus_capacity`: notice bus ring size (min 1)
/// - `record_task_logs`: whether log locations are recorded
/// - `flush_backoff`: retry delays after a failed flush
#[derive(Clone, Debug)]
pub struct Config {
    /// Period of the producer flush loop.
    pub flush_interval: Duration,

    /// Maximum number of events a producer buffers between flushes.
    ///
    /// When full, profiling events are dropped first. `0` = unbounded.
    pub max_buffered_events: usize,

    /// When `false`, producers refuse profiling events up front.
    pub profile_events_enabled: bool,

    /// Profile spans retained per task in the registry. `0` = unbounded.
    pub max_profile_events_per_task: usize,

    /// Delay between a job ending and the sweep that fails its leftover tasks.
    pub job_grace_delay: Duration,

    /// Capacity of the notice bus ring buffer.
    pub bus_capacity: usize,

    /// When `false`, log-location reports are ignored.
    pub record_task_logs: bool,

    /// Backoff applied by the reporter after failed deliveries.
    pub flush_backoff: BackoffPolicy,
}

impl Config {
    /// Producer buffer cap as an `Option` (`None` = unbounded).
    #[inline]
    pub fn buffer_capacity(&self) -> Option<usize> {
        if self.max_buffered_events == 0 {
            None
        } else {
            Some(self.max_buffered_events)
        }
    }

    /// Per-task profile history cap as an `Option` (`None` = unbounded).
    #[inline]
    pub fn profile_history_cap(&self) -> Option<usize> {
        if self.max_profile_events_per_task == 0 {
            None
        } else {
            Some(self.max_profile_events_per_task)
        }
    }

    /// Grace delay as an `Option` (`None` = sweep immediately).
    #[inline]
    pub fn grace_delay(&self) -> Option<Duration> {
        if self.job_grace_delay == Duration::ZERO {
            None
        } else {
            Some(self.job_grace_delay)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `flush_interval = 100ms`
    /// - `max_buffered_events = 10_000`
    /// - `profile_events_enabled = true`
    /// - `max_profile_events_per_task = 1_000`
    /// - `job_grace_delay = 1s`
    /// - `bus_capacity = 1024`
    /// - `record_task_logs = true`
    /// - `flush_backoff = BackoffPolicy::default()`
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(100),
            max_buffered_events: 10_000,
            profile_events_enabled: true,
            max_profile_events_per_task: 1_000,
            job_grace_delay: Duration::from_secs(1),
            bus_capacity: 1024,
            record_task_logs: true,
            flush_backoff: BackoffPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinels_map_to_none() {
        let cfg = Config {
            max_buffered_events: 0,
            max_profile_events_per_task: 0,
            job_grace_delay: Duration::ZERO,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.buffer_capacity(), None);
        assert_eq!(cfg.profile_history_cap(), None);
        assert_eq!(cfg.grace_delay(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.flush_interval, Duration::from_millis(100));
        assert_eq!(cfg.grace_delay(), Some(Duration::from_secs(1)));
        assert_eq!(cfg.buffer_capacity(), Some(10_000));
    }
}
