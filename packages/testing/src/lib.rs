#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for testing the cycle engine packages.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Runs a test with a timeout to prevent infinite hangs.
///
/// If the test takes longer than the timeout to complete, the calling test panics so that
/// CI/build systems do not hang on a stuck worker thread.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under
/// Miri, where thread synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog
/// is disabled and the test function is executed directly. This allows mutation
/// testing to properly detect hanging mutations.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode).
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     // Your test code here
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// A one-shot gate that blocks threads until it is opened.
///
/// Used to make an action block indefinitely inside a cycle and release it later from the test.
/// Once opened, the latch stays open.
#[derive(Debug, Default)]
pub struct Latch {
    open: Mutex<bool>,
    changed: Condvar,
    waiting: Mutex<usize>,
    waiting_changed: Condvar,
}

impl Latch {
    /// Creates a closed latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the latch, releasing all current and future waiters.
    pub fn open(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    /// Whether the latch has been opened.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Blocks until the latch is opened.
    pub fn wait(&self) {
        {
            let mut waiting = self.waiting.lock();
            *waiting = waiting.saturating_add(1);
        }
        self.waiting_changed.notify_all();

        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
    }

    /// Blocks until at least `count` threads have called [`wait()`][Self::wait], or until
    /// `timeout` elapses. Returns whether enough waiters arrived.
    pub fn wait_for_waiters(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut waiting = self.waiting.lock();

        while *waiting < count {
            if self
                .waiting_changed
                .wait_until(&mut waiting, deadline)
                .timed_out()
            {
                return *waiting >= count;
            }
        }

        true
    }
}

/// Records which cycles were executed, to verify that every cycle in a range ran exactly once.
///
/// Safe to share between worker threads.
#[derive(Debug, Default)]
pub struct CycleLog {
    seen: Mutex<BTreeMap<u64, usize>>,
}

impl CycleLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one execution of `cycle`.
    pub fn record(&self, cycle: u64) {
        let mut seen = self.seen.lock();
        let count = seen.entry(cycle).or_default();
        *count = count.saturating_add(1);
    }

    /// The total number of recorded executions, including duplicates.
    #[must_use]
    pub fn total(&self) -> usize {
        self.seen.lock().values().sum()
    }

    /// The number of distinct cycles recorded.
    #[must_use]
    pub fn distinct(&self) -> usize {
        self.seen.lock().len()
    }

    /// Cycles that were recorded more than once.
    #[must_use]
    pub fn duplicates(&self) -> Vec<u64> {
        self.seen
            .lock()
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|(&cycle, _)| cycle)
            .collect()
    }

    /// Asserts that every cycle in `min..max` was recorded exactly once and nothing else was.
    ///
    /// # Panics
    ///
    /// Panics with a description of the first discrepancy found.
    pub fn assert_exactly_once(&self, min: u64, max: u64) {
        let seen = self.seen.lock();

        let duplicates: Vec<_> = seen
            .iter()
            .filter(|&(_, &count)| count != 1)
            .map(|(&cycle, &count)| (cycle, count))
            .take(10)
            .collect();
        assert!(
            duplicates.is_empty(),
            "cycles executed more than once (cycle, count): {duplicates:?}"
        );

        if let Some((&first, _)) = seen.first_key_value() {
            assert!(first >= min, "cycle {first} is below the range start {min}");
        }

        if let Some((&last, _)) = seen.last_key_value() {
            assert!(last < max, "cycle {last} is at or past the range end {max}");
        }

        let expected = usize::try_from(max.saturating_sub(min)).expect("test ranges fit in usize");
        assert_eq!(
            seen.len(),
            expected,
            "expected every cycle in {min}..{max} to run once"
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn watchdog_returns_correct_value() {
        let result = with_watchdog(|| "hello world");
        assert_eq!(result, "hello world");
    }

    #[test]
    #[cfg_attr(miri, ignore = "spawns threads")]
    fn latch_releases_waiters() {
        with_watchdog(|| {
            let latch = Arc::new(Latch::new());

            let waiter = thread::spawn({
                let latch = Arc::clone(&latch);
                move || latch.wait()
            });

            assert!(latch.wait_for_waiters(1, Duration::from_secs(5)));
            assert!(!latch.is_open());

            latch.open();
            waiter.join().unwrap();

            // Stays open.
            latch.wait();
        });
    }

    #[test]
    fn wait_for_waiters_times_out() {
        let latch = Latch::new();

        assert!(!latch.wait_for_waiters(1, Duration::from_millis(10)));
    }

    #[test]
    fn cycle_log_detects_duplicates() {
        let log = CycleLog::new();
        log.record(1);
        log.record(2);
        log.record(2);

        assert_eq!(log.total(), 3);
        assert_eq!(log.distinct(), 2);
        assert_eq!(log.duplicates(), [2]);
    }

    #[test]
    fn cycle_log_accepts_complete_range() {
        let log = CycleLog::new();
        for cycle in (5..15).rev() {
            log.record(cycle);
        }

        log.assert_exactly_once(5, 15);
    }

    #[test]
    #[should_panic]
    fn cycle_log_rejects_gaps() {
        let log = CycleLog::new();
        log.record(0);
        log.record(2);

        log.assert_exactly_once(0, 3);
    }
}
