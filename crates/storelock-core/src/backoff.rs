//! Retry backoff for blocking acquisition.

use std::time::Duration;

use rand::Rng;

/// Jittered pause between acquisition attempts.
///
/// Each interval is drawn uniformly from `[min, max]` so that waiters
/// which lost the same race do not retry in lockstep. Intervals are
/// always kept strictly smaller than the lease being contended for;
/// a waiter that sleeps past the holder's whole lease never notices
/// the key freeing up.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub const DEFAULT_MIN: Duration = Duration::from_millis(50);
    pub const DEFAULT_MAX: Duration = Duration::from_millis(150);

    /// Creates a backoff drawing intervals from `[min, max]`.
    /// Bounds are swapped if given in reverse order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// A fixed (jitter-free) interval.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            min: interval,
            max: interval,
        }
    }

    /// Returns this policy with both bounds capped strictly below
    /// `lease` (at half the lease, floor 1ms).
    pub(crate) fn clamped_to_lease(self, lease: Duration) -> Self {
        let cap = (lease / 2).max(Duration::from_millis(1));
        Self {
            min: self.min.min(cap),
            max: self.max.min(cap),
        }
    }

    /// Draws the next pause interval.
    pub fn interval(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_stays_within_bounds() {
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
        for _ in 0..100 {
            let i = backoff.interval();
            assert!(i >= Duration::from_millis(10));
            assert!(i <= Duration::from_millis(40));
        }
    }

    #[test]
    fn reversed_bounds_are_swapped() {
        let backoff = Backoff::new(Duration::from_millis(40), Duration::from_millis(10));
        let i = backoff.interval();
        assert!(i >= Duration::from_millis(10));
        assert!(i <= Duration::from_millis(40));
    }

    #[test]
    fn fixed_backoff_has_no_jitter() {
        let backoff = Backoff::fixed(Duration::from_millis(25));
        assert_eq!(backoff.interval(), Duration::from_millis(25));
    }

    #[test]
    fn clamp_keeps_interval_below_lease() {
        let backoff = Backoff::default().clamped_to_lease(Duration::from_millis(20));
        for _ in 0..50 {
            assert!(backoff.interval() <= Duration::from_millis(10));
        }
    }
}
