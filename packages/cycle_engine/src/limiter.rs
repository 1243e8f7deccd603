use std::num::NonZero;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Paces the start of cycles.
///
/// Motors call [`acquire()`][Self::acquire] before each cycle. The time spent waiting is
/// recorded as the scheduling delay of the cycle.
pub trait CycleLimiter: Send + Sync {
    /// Blocks until the next cycle may start and returns how long that took.
    fn acquire(&self) -> Duration;
}

/// A limiter that admits cycles at a fixed rate shared by all motors.
///
/// Each call reserves the next slot on a shared schedule and sleeps until it arrives. If callers
/// fall behind, slots in the past are granted immediately without building up a burst budget.
#[derive(Debug)]
pub struct FixedRateLimiter {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl FixedRateLimiter {
    /// Creates a limiter that admits `cycles_per_second` cycles per second.
    #[must_use]
    pub fn per_second(cycles_per_second: NonZero<u32>) -> Self {
        Self {
            interval: Duration::from_secs(1)
                .checked_div(cycles_per_second.get())
                .unwrap_or_default(),
            next_slot: Mutex::new(None),
        }
    }

    /// The time between two admitted cycles.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl CycleLimiter for FixedRateLimiter {
    fn acquire(&self) -> Duration {
        let now = Instant::now();

        let slot = {
            let mut next_slot = self.next_slot.lock();

            let slot = next_slot.map_or(now, |scheduled| scheduled.max(now));
            *next_slot = Some(slot.checked_add(self.interval).unwrap_or(slot));
            slot
        };

        let wait = slot.saturating_duration_since(now);

        if !wait.is_zero() {
            thread::sleep(wait);
        }

        wait
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(FixedRateLimiter: CycleLimiter, Send, Sync);

    #[test]
    fn interval_from_rate() {
        assert_eq!(
            FixedRateLimiter::per_second(nz!(4)).interval(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn first_acquire_is_immediate() {
        let limiter = FixedRateLimiter::per_second(nz!(1));

        assert_eq!(limiter.acquire(), Duration::ZERO);
    }

    #[test]
    #[cfg_attr(miri, ignore = "sleeps")]
    fn later_acquires_wait_for_their_slot() {
        let limiter = FixedRateLimiter::per_second(nz!(100));

        let started = Instant::now();
        let waits: Vec<_> = (0..5).map(|_| limiter.acquire()).collect();

        assert_eq!(waits[0], Duration::ZERO);
        assert!(waits[1..].iter().any(|wait| !wait.is_zero()));
        assert!(started.elapsed() >= Duration::from_millis(35));
    }
}
