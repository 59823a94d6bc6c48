//! # Restart backoff for faulted workers.
//!
//! [`BackoffPolicy`] turns a worker's current fault streak into the delay
//! before its next restart:
//!
//! ```text
//! delay(k) = min(first × factor^k, max)   then jitter
//! ```
//!
//! `k` is the number of faults in a row without a published record in
//! between, starting at 0. Because the base is recomputed from `k` alone,
//! jitter never feeds back into later delays, and with `factor >= 1` the
//! un-jittered delay is non-decreasing in `k` and never above `max`.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use telehub::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_secs(1),
//!     max: Duration::from_secs(60),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_secs(1));
//! assert_eq!(backoff.next(3), Duration::from_secs(8));
//! assert_eq!(backoff.next(10), Duration::from_secs(60));
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::policies::jitter::JitterPolicy;

/// Restart delay policy.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first fault of a streak.
    pub first: Duration,
    /// Ceiling for any delay.
    pub max: Duration,
    /// Growth per additional fault (`>= 1.0` for non-decreasing delays).
    pub factor: f64,
    /// Randomization applied to the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// 1s, 2s, 4s, … capped at 60s, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(60),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before restarting after the `streak`-th consecutive fault (0-indexed).
    pub fn next(&self, streak: u32) -> Duration {
        let base = self.base(streak);
        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            other => other.apply(base),
        }
    }

    /// Un-jittered delay, clamped to `max`.
    fn base(&self, streak: u32) -> Duration {
        let exp = streak.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if secs.is_finite() && secs >= 0.0 && secs <= self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            jitter,
            ..BackoffPolicy::default()
        }
    }

    #[test]
    fn doubles_from_one_second() {
        let p = policy(JitterPolicy::None);
        let got: Vec<u64> = (0..7).map(|k| p.next(k).as_secs()).collect();
        assert_eq!(got, vec![1, 2, 4, 8, 16, 32, 60]);
    }

    #[test]
    fn non_decreasing_and_capped() {
        let p = policy(JitterPolicy::None);
        let mut prev = Duration::ZERO;
        for k in 0..200 {
            let d = p.next(k);
            assert!(d >= prev, "streak {k}: {d:?} < {prev:?}");
            assert!(d <= p.max, "streak {k}: {d:?} above ceiling");
            prev = d;
        }
        assert_eq!(p.next(u32::MAX), p.max);
    }

    #[test]
    fn first_above_max_is_clamped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(90),
            ..policy(JitterPolicy::None)
        };
        assert_eq!(p.next(0), Duration::from_secs(60));
    }

    #[test]
    fn constant_factor_stays_flat() {
        let p = BackoffPolicy {
            factor: 1.0,
            first: Duration::from_millis(500),
            ..policy(JitterPolicy::None)
        };
        assert!((0..20).all(|k| p.next(k) == Duration::from_millis(500)));
    }

    #[test]
    fn full_jitter_stays_under_base() {
        let p = policy(JitterPolicy::Full);
        for k in 0..12 {
            assert!(p.next(k) <= p.base(k));
        }
    }

    #[test]
    fn equal_jitter_keeps_half_of_base() {
        let p = policy(JitterPolicy::Equal);
        for k in 0..12 {
            let base = p.base(k);
            let d = p.next(k);
            assert!(d >= base / 2 - Duration::from_millis(1), "streak {k}: {d:?}");
            assert!(d <= base);
        }
    }

    #[test]
    fn decorrelated_jitter_respects_bounds() {
        let p = policy(JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let d = p.next(8);
            assert!(d >= p.first && d <= p.max, "{d:?}");
        }
    }
}
