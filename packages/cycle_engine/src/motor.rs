use std::mem;
use std::num::NonZero;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use cycle_results::{CycleResult, CycleSegmentBuffer, MutableCycleResult, ResultCode};
use new_zealand::nz;
use nm::Event;
use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::metrics::{CYCLE_SERVICE_TIME_US, CYCLES_EXECUTED, CYCLES_FAILED, SEGMENTS_CLAIMED};
use crate::{
    Action, CycleLimiter, CycleSegment, Error, FatalError, Input, ResultSink, RunState,
    RunStateTally, StopMode,
};

/// The result code recorded for a cycle whose action raised a fatal error.
pub const FATAL_RESULT_CODE: ResultCode = -1;

/// Upper bound on how many results a motor buffers before handing them to the sink.
///
/// Segments longer than this are delivered to the sink in several parts.
const MAX_BUFFERED_RESULTS: NonZero<usize> = nz!(4096);

/// Activity-wide signals shared by all motors and the executor.
#[derive(Debug, Default)]
pub(crate) struct ActivitySignals {
    failures: Mutex<Vec<(usize, String)>>,

    /// Set when any motor fails. All motors treat it as an after-cycle stop request.
    halted: AtomicBool,
}

impl ActivitySignals {
    fn record_failure(&self, slot: usize, message: &str) {
        self.failures.lock().push((slot, message.to_string()));
        self.halted.store(true, Ordering::Release);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// The first failure recorded since the last reset, as an error.
    pub(crate) fn first_failure(&self) -> Option<Error> {
        self.failures
            .lock()
            .first()
            .map(|(slot, message)| Error::MotorErrored {
                slot: *slot,
                message: message.clone(),
            })
    }

    pub(crate) fn reset(&self) {
        self.failures.lock().clear();
        self.halted.store(false, Ordering::Release);
    }
}

/// Everything a motor needs that is shared with the other motors of its activity.
#[derive(derive_more::Debug)]
pub(crate) struct MotorContext {
    pub(crate) alias: String,

    #[debug(skip)]
    pub(crate) input: Arc<dyn Input>,

    pub(crate) stride: NonZero<u64>,

    #[debug(skip)]
    pub(crate) limiter: Option<Arc<dyn CycleLimiter>>,

    #[debug(skip)]
    pub(crate) sink: Option<Arc<dyn ResultSink>>,

    pub(crate) signals: Arc<ActivitySignals>,
}

/// The part of a motor that the executor keeps: its state cell and its stop request.
#[derive(Debug)]
pub(crate) struct MotorControl {
    slot: usize,
    state: AtomicU8,
    stop: AtomicU8,
    tally: Arc<RunStateTally>,
}

impl MotorControl {
    /// Creates the control of an `Unstarted` motor and counts it in `tally`.
    pub(crate) fn new(slot: usize, tally: Arc<RunStateTally>) -> Self {
        tally.add(RunState::Unstarted);

        Self {
            slot,
            state: AtomicU8::new(RunState::Unstarted as u8),
            stop: AtomicU8::new(0),
            tally,
        }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the motor to `to` if that is a valid transition from its current state.
    pub(crate) fn enter(&self, to: RunState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            let from = RunState::from_u8(current);

            if !from.can_transition_to(to) {
                debug!(slot = self.slot, %from, %to, "ignoring invalid motor state transition");
                return false;
            }

            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.tally.change(from, to);
                    trace!(slot = self.slot, %from, %to, "motor state changed");
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn request_stop(&self, mode: StopMode) {
        self.stop.fetch_max(mode as u8, Ordering::AcqRel);
    }

    fn stop_mode(&self) -> Option<StopMode> {
        StopMode::from_u8(self.stop.load(Ordering::Acquire))
    }

    /// Stops counting this motor in the tally. Used when the motor leaves the pool.
    pub(crate) fn detach(&self) {
        self.tally.remove(self.state());
    }
}

enum Exit {
    Finished,
    Stopped,
    Failed { cycle: Option<u64>, error: FatalError },
}

/// A worker loop that claims segments of cycles and executes them through its action.
///
/// Runs on its own thread until the input is exhausted, a stop is requested or the action
/// raises a fatal error.
pub(crate) struct Motor {
    control: Arc<MotorControl>,
    context: Arc<MotorContext>,
    action: Box<dyn Action>,
}

impl Motor {
    pub(crate) fn new(
        control: Arc<MotorControl>,
        context: Arc<MotorContext>,
        action: Box<dyn Action>,
    ) -> Self {
        Self {
            control,
            context,
            action,
        }
    }

    pub(crate) fn run(mut self) {
        let slot = self.control.slot();

        if !self.control.enter(RunState::Starting) {
            return;
        }

        debug!(alias = %self.context.alias, slot, "motor starting");

        let initialized = panic::catch_unwind(AssertUnwindSafe(|| self.action.init()))
            .unwrap_or_else(|payload| Err(FatalError::from_panic(&*payload)));

        if let Err(error) = initialized {
            self.fail(None, &error);
            return;
        }

        self.control.enter(RunState::Running);

        match self.run_cycles() {
            Exit::Finished => {
                self.control.enter(RunState::Finished);
                debug!(alias = %self.context.alias, slot, "motor finished");
            }
            Exit::Stopped => {
                self.control.enter(RunState::Stopping);
                self.control.enter(RunState::Stopped);
                debug!(alias = %self.context.alias, slot, "motor stopped");
            }
            Exit::Failed { cycle, error } => self.fail(cycle, &error),
        }
    }

    fn stop_mode(&self) -> Option<StopMode> {
        self.control.stop_mode().or_else(|| {
            self.context
                .signals
                .is_halted()
                .then_some(StopMode::AfterCycle)
        })
    }

    fn run_cycles(&mut self) -> Exit {
        loop {
            if self.stop_mode().is_some() {
                return Exit::Stopped;
            }

            let Some(segment) = self.context.input.input_segment(self.context.stride) else {
                return Exit::Finished;
            };

            SEGMENTS_CLAIMED.with(|event| event.observe(segment.remaining()));

            if let Some(exit) = self.run_segment(segment) {
                return exit;
            }
        }
    }

    /// Executes the cycles of one segment. Returns `None` if the motor should claim another.
    fn run_segment(&mut self, mut segment: CycleSegment) -> Option<Exit> {
        let mut buffer = new_buffer(segment.remaining());

        while let Some(cycle) = segment.next_cycle() {
            let delay = self
                .context
                .limiter
                .as_ref()
                .map_or(Duration::ZERO, |limiter| limiter.acquire());

            let pending = MutableCycleResult::start(cycle, delay);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.action.run_cycle(cycle)))
                .unwrap_or_else(|payload| Err(FatalError::from_panic(&*payload)));

            match outcome {
                Ok(code) => self.record(pending.complete(code), &mut buffer, &segment),
                Err(error) => {
                    self.record(pending.complete(FATAL_RESULT_CODE), &mut buffer, &segment);
                    self.publish(buffer);

                    return Some(Exit::Failed {
                        cycle: Some(cycle),
                        error,
                    });
                }
            }

            if self.stop_mode() == Some(StopMode::AfterCycle) {
                let abandoned = segment.remaining();

                if abandoned > 0 {
                    debug!(
                        alias = %self.context.alias,
                        slot = self.control.slot(),
                        abandoned,
                        next = segment.peek_next_cycle(),
                        "stopping with unexecuted cycles in claimed segment"
                    );
                }

                self.publish(buffer);
                return Some(Exit::Stopped);
            }
        }

        self.publish(buffer);
        None
    }

    fn record(
        &self,
        result: CycleResult,
        buffer: &mut CycleSegmentBuffer,
        segment: &CycleSegment,
    ) {
        CYCLES_EXECUTED.with(Event::observe_once);
        CYCLE_SERVICE_TIME_US.with(|event| event.observe(result.service_time().as_micros()));

        if !result.is_success() {
            CYCLES_FAILED.with(Event::observe_once);
            trace!(
                slot = self.control.slot(),
                cycle = result.cycle(),
                code = result.result(),
                "cycle failed"
            );
        }

        if buffer.is_full() {
            let full = mem::replace(buffer, new_buffer(segment.remaining().saturating_add(1)));
            self.publish(full);
        }

        buffer
            .append(result)
            .expect("a buffer with no room is replaced before appending");
    }

    fn publish(&self, buffer: CycleSegmentBuffer) {
        if buffer.is_empty() {
            return;
        }

        if let Some(sink) = &self.context.sink {
            sink.on_results(buffer.freeze());
        }
    }

    fn fail(&self, cycle: Option<u64>, error: &FatalError) {
        let slot = self.control.slot();

        error!(alias = %self.context.alias, slot, cycle, %error, "motor failed");

        // Recorded before the state change so that anyone who sees the motor as terminal also
        // sees the failure.
        self.context.signals.record_failure(slot, error.message());
        self.control.enter(RunState::Errored);
    }
}

fn new_buffer(cycles: u64) -> CycleSegmentBuffer {
    let capacity = usize::try_from(cycles)
        .ok()
        .and_then(NonZero::new)
        .map_or(MAX_BUFFERED_RESULTS, |capacity| capacity.min(MAX_BUFFERED_RESULTS));

    CycleSegmentBuffer::new(capacity)
}
