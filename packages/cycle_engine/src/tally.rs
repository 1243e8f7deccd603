use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::RunState;

type Counts = [usize; RunState::ALL.len()];

/// Counts how many motors of an activity are in each [`RunState`] and lets callers wait for the
/// counts to reach a condition.
///
/// Motors report every transition, so waiting here replaces polling each motor.
#[derive(Debug, Default)]
pub struct RunStateTally {
    counts: Mutex<Counts>,
    changed: Condvar,
}

impl RunStateTally {
    /// Creates a tally with no motors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of motors currently in `state`.
    #[must_use]
    pub fn count(&self, state: RunState) -> usize {
        *entry(&self.counts.lock(), state)
    }

    /// A snapshot of all counts.
    #[must_use]
    pub fn image(&self) -> RunStateImage {
        RunStateImage {
            counts: *self.counts.lock(),
            timed_out: false,
        }
    }

    pub(crate) fn add(&self, state: RunState) {
        self.update(|counts| increment(counts, state));
    }

    pub(crate) fn change(&self, from: RunState, to: RunState) {
        self.update(|counts| {
            decrement(counts, from);
            increment(counts, to);
        });
    }

    pub(crate) fn remove(&self, state: RunState) {
        self.update(|counts| decrement(counts, state));
    }

    fn update(&self, f: impl FnOnce(&mut Counts)) {
        f(&mut self.counts.lock());
        self.changed.notify_all();
    }

    /// Waits until no motor is in any state other than `states`.
    ///
    /// Returns immediately if the condition already holds. The returned image reports whether the
    /// wait timed out.
    pub fn await_none_other(&self, states: &[RunState], timeout: Duration) -> RunStateImage {
        self.await_condition(timeout, |counts| {
            RunState::ALL
                .into_iter()
                .filter(|state| !states.contains(state))
                .all(|state| *entry(counts, state) == 0)
        })
    }

    /// Waits until no motor is in any of `states`.
    pub fn await_none_of(&self, states: &[RunState], timeout: Duration) -> RunStateImage {
        self.await_condition(timeout, |counts| {
            states.iter().all(|&state| *entry(counts, state) == 0)
        })
    }

    /// Waits until at least one motor is in any of `states`.
    pub fn await_any(&self, states: &[RunState], timeout: Duration) -> RunStateImage {
        self.await_condition(timeout, |counts| {
            states.iter().any(|&state| *entry(counts, state) > 0)
        })
    }

    fn await_condition(
        &self,
        timeout: Duration,
        condition: impl Fn(&Counts) -> bool,
    ) -> RunStateImage {
        // A timeout too large to represent as a deadline means waiting without one.
        let deadline = Instant::now().checked_add(timeout);
        let mut counts = self.counts.lock();

        while !condition(&*counts) {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut counts, deadline).timed_out() {
                        return image_of(&counts, !condition(&*counts));
                    }
                }
                None => self.changed.wait(&mut counts),
            }
        }

        image_of(&counts, false)
    }
}

fn image_of(counts: &Counts, timed_out: bool) -> RunStateImage {
    RunStateImage {
        counts: *counts,
        timed_out,
    }
}

fn entry(counts: &Counts, state: RunState) -> &usize {
    counts
        .get(state.index())
        .expect("the counts array has one entry per state")
}

fn increment(counts: &mut Counts, state: RunState) {
    let count = counts
        .get_mut(state.index())
        .expect("the counts array has one entry per state");
    *count = count.saturating_add(1);
}

fn decrement(counts: &mut Counts, state: RunState) {
    let count = counts
        .get_mut(state.index())
        .expect("the counts array has one entry per state");
    debug_assert!(*count > 0, "removing a motor in {state} that was never counted");
    *count = count.saturating_sub(1);
}

/// A snapshot of a [`RunStateTally`], returned by its wait methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunStateImage {
    counts: Counts,
    timed_out: bool,
}

impl RunStateImage {
    /// The number of motors that were in `state`.
    #[must_use]
    pub fn count(&self, state: RunState) -> usize {
        *entry(&self.counts, state)
    }

    /// The total number of motors counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Whether the wait that produced this image gave up before its condition held.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.timed_out
    }

    /// The furthest-along state that any motor was in, if there were any motors.
    #[must_use]
    pub fn max_state(&self) -> Option<RunState> {
        RunState::ALL
            .into_iter()
            .rev()
            .find(|&state| self.count(state) > 0)
    }

    /// Whether every motor was in one of `states`.
    #[must_use]
    pub fn is_none_other(&self, states: &[RunState]) -> bool {
        RunState::ALL
            .into_iter()
            .filter(|state| !states.contains(state))
            .all(|state| self.count(state) == 0)
    }
}

impl fmt::Display for RunStateImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        for state in RunState::ALL {
            let count = self.count(state);
            if count == 0 {
                continue;
            }

            if !first {
                f.write_str(" ")?;
            }
            first = false;

            write!(f, "{state}:{count}")?;
        }

        if self.timed_out {
            f.write_str(" (timed out)")?;
        }

        Ok(())
    }
}
