use std::time::{Duration, Instant};

use derive_more::Display;

/// The outcome of executing one cycle.
///
/// Zero means success. Any other value is an operation-specific failure code; the meaning of
/// nonzero codes belongs to whatever executed the operation.
pub type ResultCode = i32;

/// The [`ResultCode`] of a successful cycle.
pub const SUCCESS: ResultCode = 0;

/// The recorded outcome of one executed cycle.
///
/// Instances are produced by [`MutableCycleResult::complete()`] and are immutable afterwards.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display("cycle {cycle} -> {result}")]
pub struct CycleResult {
    cycle: u64,
    result: ResultCode,
    started: Instant,
    ended: Instant,
    scheduling_delay: Duration,
}

impl CycleResult {
    /// Creates a result from its parts.
    ///
    /// If `ended` precedes `started`, the service time is treated as zero.
    #[must_use]
    pub fn new(
        cycle: u64,
        result: ResultCode,
        started: Instant,
        ended: Instant,
        scheduling_delay: Duration,
    ) -> Self {
        Self {
            cycle,
            result,
            started,
            ended,
            scheduling_delay,
        }
    }

    /// The cycle number this result belongs to.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The result code of the cycle.
    #[must_use]
    pub fn result(&self) -> ResultCode {
        self.result
    }

    /// Whether the cycle completed with [`SUCCESS`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result == SUCCESS
    }

    /// When execution of the cycle started.
    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }

    /// When execution of the cycle ended.
    #[must_use]
    pub fn ended(&self) -> Instant {
        self.ended
    }

    /// How long the cycle waited to be scheduled before execution started.
    #[must_use]
    pub fn scheduling_delay(&self) -> Duration {
        self.scheduling_delay
    }

    /// How long the operation itself took, excluding any scheduling delay.
    #[must_use]
    pub fn service_time(&self) -> Duration {
        self.ended.saturating_duration_since(self.started)
    }

    /// The total time attributable to the cycle: scheduling delay plus service time.
    #[must_use]
    pub fn op_time(&self) -> Duration {
        self.scheduling_delay.saturating_add(self.service_time())
    }

    /// [`service_time()`][Self::service_time] in nanoseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn service_nanos(&self) -> u64 {
        saturating_nanos(self.service_time())
    }

    /// [`op_time()`][Self::op_time] in nanoseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn op_nanos(&self) -> u64 {
        saturating_nanos(self.op_time())
    }
}

/// A cycle result that is still being recorded.
///
/// Created right before the operation for a cycle runs and consumed by
/// [`complete()`][Self::complete] right after it finishes. Because completion consumes the value,
/// whoever completed a result cannot modify it after handing it off.
#[derive(Debug)]
pub struct MutableCycleResult {
    cycle: u64,
    result: ResultCode,
    started: Instant,
    scheduling_delay: Duration,
}

impl MutableCycleResult {
    /// Starts recording the result of `cycle`, stamping the start time as now.
    ///
    /// `scheduling_delay` is any time the cycle spent waiting before it could start, for
    /// example in a rate limiter.
    #[must_use]
    pub fn start(cycle: u64, scheduling_delay: Duration) -> Self {
        Self {
            cycle,
            result: SUCCESS,
            started: Instant::now(),
            scheduling_delay,
        }
    }

    /// The cycle number being recorded.
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The result code recorded so far.
    #[must_use]
    pub fn result(&self) -> ResultCode {
        self.result
    }

    /// Records an interim result code, for example after a failed attempt that will be retried.
    pub fn set_result(&mut self, result: ResultCode) {
        self.result = result;
    }

    /// The time attributable to the cycle so far: scheduling delay plus elapsed execution time.
    #[must_use]
    pub fn op_nanos(&self) -> u64 {
        saturating_nanos(self.scheduling_delay.saturating_add(self.started.elapsed()))
    }

    /// Stamps the end time as now and freezes the result with the given code.
    #[must_use]
    pub fn complete(self, result: ResultCode) -> CycleResult {
        CycleResult::new(
            self.cycle,
            result,
            self.started,
            Instant::now(),
            self.scheduling_delay,
        )
    }

    /// Stamps the end time as now and freezes the result with the last recorded code.
    #[must_use]
    pub fn finish(self) -> CycleResult {
        let result = self.result;
        self.complete(result)
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
