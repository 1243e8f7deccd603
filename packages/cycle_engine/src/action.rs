use std::any::{Any, type_name};
use std::num::NonZero;
use std::{fmt, mem};

use cycle_results::{ResultCode, SUCCESS};
use op_sequence::{SequencePlanner, SharedOpSequence};
use thiserror::Error;
use tracing::{debug, trace};

use crate::ActivityConfig;

/// A failure that must stop the motor that encountered it.
///
/// Ordinary operation failures are not fatal: they are reported as nonzero result codes and the
/// motor moves on to the next cycle.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FatalError {
    message: String,
}

impl FatalError {
    /// Creates a fatal error with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The description of the error.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("non-string panic payload");

        Self::new(format!("panic: {detail}"))
    }
}

/// Executes cycles on behalf of one motor.
///
/// Each motor owns its own action, so implementations can keep per-thread state such as
/// connections or buffers without synchronization.
///
/// Closures of the form `FnMut(u64) -> Result<ResultCode, FatalError>` implement this trait.
pub trait Action: Send {
    /// Called once on the motor thread before the first cycle.
    ///
    /// # Errors
    ///
    /// A fatal error moves the motor to `Errored` without running any cycles.
    fn init(&mut self) -> Result<(), FatalError> {
        Ok(())
    }

    /// Executes one cycle, returning [`SUCCESS`] or an operation-specific failure code.
    ///
    /// # Errors
    ///
    /// A fatal error moves the motor to `Errored` and stops the activity.
    fn run_cycle(&mut self, cycle: u64) -> Result<ResultCode, FatalError>;
}

impl<F> Action for F
where
    F: FnMut(u64) -> Result<ResultCode, FatalError> + Send,
{
    fn run_cycle(&mut self, cycle: u64) -> Result<ResultCode, FatalError> {
        self(cycle)
    }
}

/// Creates one [`Action`] per motor slot.
///
/// Closures of the form `Fn(usize) -> impl Action` implement this trait.
pub trait ActionDispenser: Send + Sync {
    /// Called once each time the activity starts, before any motor is created.
    ///
    /// # Errors
    ///
    /// A fatal error here fails
    /// [`ActivityExecutor::start_activity()`][crate::ActivityExecutor::start_activity].
    fn prepare(&self) -> Result<(), FatalError> {
        Ok(())
    }

    /// Creates the action for the motor in `slot`.
    fn action(&self, slot: usize) -> Box<dyn Action>;
}

impl<F, A> ActionDispenser for F
where
    F: Fn(usize) -> A + Send + Sync,
    A: Action + 'static,
{
    fn action(&self, slot: usize) -> Box<dyn Action> {
        Box::new(self(slot))
    }
}

/// An executable operation synthesized for one cycle.
pub trait CycleOp {
    /// Executes the operation.
    ///
    /// May be called more than once for the same cycle if an earlier attempt failed with a
    /// retryable error.
    ///
    /// # Errors
    ///
    /// Returns [`OpFailure`] when the operation did not succeed.
    fn execute(&mut self, cycle: u64) -> Result<(), OpFailure>;
}

/// Why a [`CycleOp`] did not succeed.
#[derive(Debug)]
#[non_exhaustive]
pub enum OpFailure {
    /// The operation failed with a result code. The motor records it and continues.
    Failed {
        /// The result code to record for the cycle.
        code: NonZero<ResultCode>,

        /// Whether executing the operation again may succeed.
        retryable: bool,
    },

    /// The operation hit a condition that must stop the motor.
    Fatal(FatalError),
}

impl OpFailure {
    /// A failure that is recorded without retrying.
    #[must_use]
    pub fn failed(code: NonZero<ResultCode>) -> Self {
        Self::Failed {
            code,
            retryable: false,
        }
    }

    /// A failure that is retried while the retry budget allows.
    #[must_use]
    pub fn retryable(code: NonZero<ResultCode>) -> Self {
        Self::Failed {
            code,
            retryable: true,
        }
    }
}

impl From<FatalError> for OpFailure {
    fn from(error: FatalError) -> Self {
        Self::Fatal(error)
    }
}

/// Synthesizes the operation for a cycle from a template.
///
/// Used as the element type of an operation sequence: the sequence picks the dispenser for a
/// cycle and the dispenser builds the concrete operation. Treated as a pure function of the
/// cycle number.
pub trait OpDispenser: Send + Sync {
    /// The operation type this dispenser produces.
    type Op: CycleOp;

    /// Builds the operation for `cycle`.
    ///
    /// # Errors
    ///
    /// A fatal error stops the motor.
    fn apply(&self, cycle: u64) -> Result<Self::Op, FatalError>;

    /// A name for the operation template, used in logs.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// Dispatches each cycle through an operation sequence.
///
/// For every cycle, the action resolves the dispenser from the current sequence, synthesizes the
/// operation and executes it, retrying retryable failures up to `max_tries` attempts in total.
/// The result code of the last attempt is recorded.
///
/// The sequence is read through a [`SharedOpSequence`], so the operation mix can be replaced
/// while the activity runs by swapping it via [`ops()`][Self::ops].
pub struct OpSequenceActions<D> {
    ops: SharedOpSequence<D>,
    max_tries: NonZero<u32>,
}

impl<D> OpSequenceActions<D> {
    /// Creates a dispatcher over `ops` with the given retry budget.
    #[must_use]
    pub fn new(ops: SharedOpSequence<D>, max_tries: NonZero<u32>) -> Self {
        Self { ops, max_tries }
    }

    /// The shared sequence the actions read from.
    #[must_use]
    pub fn ops(&self) -> &SharedOpSequence<D> {
        &self.ops
    }

    /// The maximum number of attempts per cycle.
    #[must_use]
    pub fn max_tries(&self) -> NonZero<u32> {
        self.max_tries
    }
}

impl<D> fmt::Debug for OpSequenceActions<D>
where
    D: fmt::Debug,
{
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("ops", &self.ops)
            .field("max_tries", &self.max_tries)
            .finish()
    }
}

impl<D> ActionDispenser for OpSequenceActions<D>
where
    D: OpDispenser + 'static,
{
    fn action(&self, slot: usize) -> Box<dyn Action> {
        Box::new(OpSequenceAction {
            ops: self.ops.clone(),
            max_tries: self.max_tries,
            slot,
        })
    }
}

/// Turns a deferred description of the workload into the activity's action source.
///
/// Resolved by the executor on the first start, using the activity's configuration.
pub(crate) trait ActionPlan: Send {
    fn resolve(&mut self, config: &ActivityConfig)
    -> op_sequence::Result<Box<dyn ActionDispenser>>;
}

impl<D> ActionPlan for SequencePlanner<D>
where
    D: OpDispenser + 'static,
{
    fn resolve(
        &mut self,
        config: &ActivityConfig,
    ) -> op_sequence::Result<Box<dyn ActionDispenser>> {
        self.set_sequencer(config.sequencer());

        // A plan that cannot be resolved is kept, so every start reports the same error.
        self.check()?;

        let planner = mem::replace(self, SequencePlanner::new(config.sequencer()));
        let ops = SharedOpSequence::new(planner.resolve()?);

        debug!(
            alias = config.alias(),
            sequencer = %config.sequencer(),
            max_tries = config.max_tries().get(),
            length = ops.load().len().get(),
            "operation plan resolved"
        );

        Ok(Box::new(OpSequenceActions::new(ops, config.max_tries())))
    }
}

struct OpSequenceAction<D> {
    ops: SharedOpSequence<D>,
    max_tries: NonZero<u32>,
    slot: usize,
}

impl<D> Action for OpSequenceAction<D>
where
    D: OpDispenser,
{
    fn run_cycle(&mut self, cycle: u64) -> Result<ResultCode, FatalError> {
        let ops = self.ops.load_full();
        let dispenser = ops.get(cycle);
        let mut op = dispenser.apply(cycle)?;

        let mut tries: u32 = 0;

        loop {
            tries = tries.saturating_add(1);

            match op.execute(cycle) {
                Ok(()) => return Ok(SUCCESS),
                Err(OpFailure::Fatal(error)) => return Err(error),
                Err(OpFailure::Failed { code, retryable }) => {
                    if !retryable || tries >= self.max_tries.get() {
                        return Ok(code.get());
                    }

                    trace!(
                        slot = self.slot,
                        cycle,
                        op = dispenser.name(),
                        tries,
                        code = code.get(),
                        "retrying failed operation"
                    );
                }
            }
        }
    }
}
