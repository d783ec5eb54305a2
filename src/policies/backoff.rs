//! # Retry backoff for failed flushes.
//!
//! When an [`EventSink`](crate::EventSink) is unavailable the
//! [`Reporter`](crate::Reporter) keeps events buffered and retries after a
//! growing delay: `first × factor^n`, clamped to `max`, then jittered.
//!
//! The base delay depends only on the failure count, so jitter never feeds
//! back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tasklineage::{BackoffPolicy, Jitter};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: Jitter::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(3), Duration::from_millis(800));
//! assert_eq!(backoff.next(20), Duration::from_secs(5));
//! ```

use std::time::Duration;

use rand::Rng;

/// Randomization applied on top of the computed delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2 + uniform[0, delay/2]`.
    Equal,
}

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::rng();
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=ms)),
            Jitter::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}

/// Exponential backoff parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound on any delay.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `max = 10s`, `factor = 2.0`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(10),
            factor: 2.0,
            jitter: Jitter::Equal,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after `failures` consecutive failures (0-indexed).
    pub fn next(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: Jitter) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn grows_exponentially_without_jitter() {
        let p = policy(Jitter::None);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(200));
        assert_eq!(p.next(4), Duration::from_millis(1600));
    }

    #[test]
    fn overflow_clamps_to_max() {
        assert_eq!(policy(Jitter::None).next(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn equal_jitter_stays_in_upper_half() {
        let p = policy(Jitter::Equal);
        for failures in 0..12 {
            let base = policy(Jitter::None).next(failures);
            let d = p.next(failures);
            assert!(d >= base / 2, "failures={failures} delay={d:?}");
            assert!(d <= base, "failures={failures} delay={d:?}");
        }
    }

    #[test]
    fn full_jitter_never_exceeds_base() {
        let p = policy(Jitter::Full);
        for failures in 0..12 {
            assert!(p.next(failures) <= policy(Jitter::None).next(failures));
        }
    }
}
