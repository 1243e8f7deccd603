use std::any::type_name;
use std::fmt;
use std::num::NonZero;
use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use op_sequence::SequencePlanner;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::action::ActionPlan;
use crate::motor::{ActivitySignals, Motor, MotorContext, MotorControl};
use crate::{
    ActionDispenser, ActivityConfig, AtomicInput, CycleLimiter, Error, Input, OpDispenser, Result,
    ResultSink, RunState, RunStateTally, StopMode,
};

/// Runs one activity: a pool of motors that execute the activity's cycles.
///
/// The executor owns the motor threads. Each motor claims segments of cycles from a shared
/// [`Input`], so every cycle is executed by exactly one motor no matter how many motors there
/// are or how often the pool is resized.
///
/// All methods take `&self`. Lifecycle operations (start, stop, resize) are serialized with each
/// other, while [`await_completion()`][Self::await_completion] and the inspection methods can be
/// called at any time from any thread.
///
/// Dropping the executor stops any running motors after their in-flight cycle and waits for
/// their threads to exit.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use cycle_engine::{ActivityConfig, ActivityExecutor, FatalError};
/// use cycle_results::SUCCESS;
/// use new_zealand::nz;
///
/// let config = ActivityConfig::builder()
///     .cycles("1000".parse()?)
///     .threads(nz!(4))
///     .stride(nz!(10))
///     .build();
///
/// let executor = ActivityExecutor::new(config, |_slot: usize| {
///     |_cycle: u64| Ok::<_, FatalError>(SUCCESS)
/// });
///
/// executor.start_activity()?;
/// assert!(executor.await_completion(Duration::from_secs(60))?);
/// # Ok::<(), cycle_engine::Error>(())
/// ```
pub struct ActivityExecutor {
    config: ActivityConfig,
    tally: Arc<RunStateTally>,
    signals: Arc<ActivitySignals>,
    pool: Mutex<Pool>,
}

#[derive(derive_more::Debug)]
struct Pool {
    #[debug(skip)]
    actions: Option<Arc<dyn ActionDispenser>>,

    /// Resolved into `actions` on the first start that gets that far.
    #[debug(skip)]
    plan: Option<Box<dyn ActionPlan>>,

    #[debug(skip)]
    input: Option<Arc<dyn Input>>,

    #[debug(skip)]
    sink: Option<Arc<dyn ResultSink>>,

    #[debug(skip)]
    limiter: Option<Arc<dyn CycleLimiter>>,

    /// Created on first start and reused by every restart, so a restarted activity resumes
    /// from the cycles it has not yet claimed.
    context: Option<Arc<MotorContext>>,

    started: bool,
    target_threads: NonZero<usize>,
    motors: Vec<MotorHandle>,
    next_slot: usize,
}

#[derive(Debug)]
struct MotorHandle {
    control: Arc<MotorControl>,
    thread: Option<JoinHandle<()>>,
}

impl MotorHandle {
    fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // Action panics are caught by the motor, so this is a defect in the motor itself.
        if let Err(payload) = thread.join() {
            panic::resume_unwind(payload);
        }
    }
}

impl ActivityExecutor {
    /// Creates an executor that runs the cycles described by `config` through actions created
    /// by `actions`, with no result sink and no rate limit.
    #[must_use]
    pub fn new(config: ActivityConfig, actions: impl ActionDispenser + 'static) -> Self {
        Self::builder(config, actions).build()
    }

    /// Starts building an executor with optional collaborators.
    #[must_use]
    pub fn builder(
        config: ActivityConfig,
        actions: impl ActionDispenser + 'static,
    ) -> ActivityExecutorBuilder {
        ActivityExecutorBuilder {
            config,
            actions: Some(Arc::new(actions)),
            plan: None,
            input: None,
            sink: None,
            limiter: None,
        }
    }

    /// Starts building an executor whose actions dispatch cycles through the operations of
    /// `planner`.
    ///
    /// The plan is sequenced when the activity first starts, with the sequencer and retry budget
    /// of `config`. The sequencer the planner was created with is not used. Plans that cannot be
    /// sequenced fail [`start_activity()`][Self::start_activity] with [`Error::Sequence`].
    ///
    /// Use [`builder()`][Self::builder] with an [`OpSequenceActions`][crate::OpSequenceActions]
    /// to keep a handle for replacing the operation mix while the activity runs.
    #[must_use]
    pub fn planned<D>(
        config: ActivityConfig,
        planner: SequencePlanner<D>,
    ) -> ActivityExecutorBuilder
    where
        D: OpDispenser + 'static,
    {
        ActivityExecutorBuilder {
            config,
            actions: None,
            plan: Some(Box::new(planner)),
            input: None,
            sink: None,
            limiter: None,
        }
    }

    /// The configuration the executor was created with.
    #[must_use]
    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Starts the activity with the configured number of motors.
    ///
    /// Validates the configuration and prepares the action source before any motor starts.
    /// Returns once every motor has initialized its action and is running, or has failed to.
    /// Does nothing if the activity is already started.
    ///
    /// While motors initialize, other threads can inspect the executor and resize or stop the
    /// activity. Stopping or shrinking still waits for a motor's `init()` to return, so an
    /// `init()` that never returns blocks those calls too.
    ///
    /// Starting an activity that was stopped resumes from the cycles not yet claimed. If the
    /// start fails after motors were created, those motors are stopped and the activity can be
    /// started again.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the operation plan cannot be sequenced,
    /// the action source fails to prepare, a motor thread cannot be spawned or a motor fails to
    /// initialize its action.
    pub fn start_activity(&self) -> Result<()> {
        let mut pool = self.pool.lock();

        if pool.started {
            debug!(alias = self.config.alias(), "activity already started");
            return Ok(());
        }

        self.config.validate()?;

        let actions = self.resolve_actions(&mut pool)?;

        let context = match pool.context.clone() {
            Some(context) => context,
            None => {
                let context = self.create_context(&mut pool)?;
                pool.context = Some(Arc::clone(&context));
                context
            }
        };

        actions.prepare().map_err(|error| Error::ActionSetup {
            message: error.message().to_string(),
        })?;

        // Motors from a previous run have all reached a terminal state. They leave the tally so
        // that waits only consider the motors of this run.
        for handle in pool.motors.drain(..) {
            handle.control.detach();
        }
        self.signals.reset();

        pool.started = true;

        if let Err(error) = self.launch_motors(&mut pool, &context) {
            self.abandon_start(&mut pool);
            return Err(error);
        }

        info!(
            alias = self.config.alias(),
            threads = pool.target_threads.get(),
            "activity started"
        );

        Ok(())
    }

    fn resolve_actions(&self, pool: &mut Pool) -> Result<Arc<dyn ActionDispenser>> {
        if let Some(actions) = &pool.actions {
            return Ok(Arc::clone(actions));
        }

        let plan = pool
            .plan
            .as_mut()
            .expect("an executor without actions always has a plan to create them from");

        let actions: Arc<dyn ActionDispenser> = Arc::from(plan.resolve(&self.config)?);

        pool.plan = None;
        pool.actions = Some(Arc::clone(&actions));

        Ok(actions)
    }

    fn launch_motors(
        &self,
        pool: &mut MutexGuard<'_, Pool>,
        context: &Arc<MotorContext>,
    ) -> Result<()> {
        for _ in 0..pool.target_threads.get() {
            self.spawn_motor(pool, context)?;
        }

        MutexGuard::unlocked(pool, || {
            self.tally.await_none_of(
                &[RunState::Unstarted, RunState::Starting],
                Duration::MAX,
            );
        });

        match self.signals.first_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stops and joins the motors of a start that failed, leaving the activity stopped.
    fn abandon_start(&self, pool: &mut Pool) {
        for handle in &pool.motors {
            handle.control.request_stop(StopMode::AfterCycle);
        }

        for handle in &mut pool.motors {
            handle.join();
        }

        pool.started = false;

        debug!(
            alias = self.config.alias(),
            states = %self.tally.image(),
            "start abandoned"
        );
    }

    fn create_context(&self, pool: &mut Pool) -> Result<Arc<MotorContext>> {
        let input = match pool.input.take() {
            Some(input) => input,
            None => Arc::new(AtomicInput::new(
                self.config.cycles(),
                self.config.recycles(),
            )?),
        };

        Ok(Arc::new(MotorContext {
            alias: self.config.alias().to_string(),
            input,
            stride: self.config.stride(),
            limiter: pool.limiter.take(),
            sink: pool.sink.take(),
            signals: Arc::clone(&self.signals),
        }))
    }

    fn spawn_motor(&self, pool: &mut Pool, context: &Arc<MotorContext>) -> Result<()> {
        let slot = pool.next_slot;
        pool.next_slot = slot.wrapping_add(1);

        let action = pool
            .actions
            .as_ref()
            .expect("actions are resolved before any motor is spawned")
            .action(slot);

        let control = Arc::new(MotorControl::new(slot, Arc::clone(&self.tally)));
        let motor = Motor::new(Arc::clone(&control), Arc::clone(context), action);

        let thread = thread::Builder::new()
            .name(format!("{}-motor-{slot}", context.alias))
            .spawn(move || motor.run());

        match thread {
            Ok(thread) => {
                debug!(alias = %context.alias, slot, "motor spawned");

                pool.motors.push(MotorHandle {
                    control,
                    thread: Some(thread),
                });

                Ok(())
            }
            Err(source) => {
                control.detach();
                Err(Error::MotorSpawn { source })
            }
        }
    }

    /// Changes the number of motors.
    ///
    /// If the activity is running, new motors start claiming cycles immediately and surplus
    /// motors finish their claimed segment before they exit. No cycle is skipped or executed
    /// twice because of a resize. Returns once surplus motors have exited.
    ///
    /// If the activity is not running, the count applies to the next start.
    ///
    /// # Errors
    ///
    /// Returns an error if a new motor thread cannot be spawned.
    pub fn set_thread_count(&self, threads: NonZero<usize>) -> Result<()> {
        let mut pool = self.pool.lock();
        pool.target_threads = threads;

        if !pool.started {
            debug!(
                alias = self.config.alias(),
                threads = threads.get(),
                "thread count will apply on next start"
            );
            return Ok(());
        }

        let context = pool
            .context
            .clone()
            .expect("a started activity always has a motor context");

        let active = pool.motors.len();

        if threads.get() > active {
            for _ in active..threads.get() {
                self.spawn_motor(&mut pool, &context)?;
            }
        } else if threads.get() < active {
            let mut retiring = pool.motors.split_off(threads.get());

            for handle in &retiring {
                handle.control.request_stop(StopMode::AfterSegment);
            }

            for handle in &mut retiring {
                handle.join();
                debug!(
                    alias = self.config.alias(),
                    slot = handle.control.slot(),
                    state = %handle.control.state(),
                    "motor retired"
                );
                handle.control.detach();
            }
        }

        info!(
            alias = self.config.alias(),
            from = active,
            to = threads.get(),
            "activity resized"
        );

        Ok(())
    }

    /// The number of motors the activity runs with.
    #[must_use]
    pub fn thread_count(&self) -> NonZero<usize> {
        self.pool.lock().target_threads
    }

    /// Whether the activity has been started and not stopped since.
    ///
    /// An activity whose motors have all finished is still started until it is stopped.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.pool.lock().started
    }

    /// Stops the activity.
    ///
    /// Each motor finishes its in-flight cycle and exits, abandoning the rest of its claimed
    /// segment. Returns once all motor threads have exited. Does nothing if the activity is not
    /// started.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MotorErrored`] if any motor of this run failed.
    pub fn stop_activity(&self) -> Result<()> {
        let mut pool = self.pool.lock();

        if !pool.started {
            return Ok(());
        }

        for handle in &pool.motors {
            handle.control.request_stop(StopMode::AfterCycle);
        }

        for handle in &mut pool.motors {
            handle.join();
        }

        pool.started = false;

        info!(
            alias = self.config.alias(),
            states = %self.tally.image(),
            "activity stopped"
        );

        match self.signals.first_failure() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Waits until every motor has reached a terminal state or `timeout` elapses.
    ///
    /// Returns `Ok(true)` if all motors are done, `Ok(false)` on timeout. Returns immediately
    /// with `Ok(true)` if there are no motors. A `timeout` of [`Duration::MAX`] waits forever.
    ///
    /// Can be called from any thread, including while another thread resizes the activity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MotorErrored`] if any motor of this run failed, even if others are still
    /// running when the wait ends.
    pub fn await_completion(&self, timeout: Duration) -> Result<bool> {
        let image = self.tally.await_none_other(&RunState::TERMINAL, timeout);

        if let Some(error) = self.signals.first_failure() {
            return Err(error);
        }

        debug!(alias = self.config.alias(), states = %image, "awaited completion");

        Ok(!image.is_timed_out())
    }

    /// One [`RunState::code()`] per motor, in slot order. For example `RRRF` for three running
    /// motors and one that finished.
    #[must_use]
    pub fn run_state_summary(&self) -> String {
        self.pool
            .lock()
            .motors
            .iter()
            .map(|handle| handle.control.state().code())
            .collect()
    }

    /// The tally of motor states, for waiting on conditions other than completion.
    #[must_use]
    pub fn tally(&self) -> &RunStateTally {
        &self.tally
    }
}

impl fmt::Debug for ActivityExecutor {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("config", &self.config)
            .field("tally", &self.tally)
            .field("signals", &self.signals)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Drop for ActivityExecutor {
    fn drop(&mut self) {
        let pool = self.pool.get_mut();

        for handle in &pool.motors {
            handle.control.request_stop(StopMode::AfterCycle);
        }

        for motor_thread in pool.motors.iter_mut().filter_map(|handle| handle.thread.take()) {
            if let Err(payload) = motor_thread.join() {
                if !thread::panicking() {
                    panic::resume_unwind(payload);
                }
            }
        }
    }
}

/// Builds an [`ActivityExecutor`]. Created by [`ActivityExecutor::builder()`].
#[must_use]
pub struct ActivityExecutorBuilder {
    config: ActivityConfig,
    actions: Option<Arc<dyn ActionDispenser>>,
    plan: Option<Box<dyn ActionPlan>>,
    input: Option<Arc<dyn Input>>,
    sink: Option<Arc<dyn ResultSink>>,
    limiter: Option<Arc<dyn CycleLimiter>>,
}

impl ActivityExecutorBuilder {
    /// Uses `input` as the source of cycles instead of one created from the configured cycles
    /// and recycles.
    pub fn input<I>(mut self, input: Arc<I>) -> Self
    where
        I: Input + 'static,
    {
        self.input = Some(input);
        self
    }

    /// Delivers the results of every drained segment to `sink`.
    pub fn sink<S>(mut self, sink: Arc<S>) -> Self
    where
        S: ResultSink + 'static,
    {
        self.sink = Some(sink);
        self
    }

    /// Paces cycles through `limiter`, shared by all motors.
    pub fn limiter<L>(mut self, limiter: Arc<L>) -> Self
    where
        L: CycleLimiter + 'static,
    {
        self.limiter = Some(limiter);
        self
    }

    /// Creates the executor. No motor starts until
    /// [`start_activity()`][ActivityExecutor::start_activity].
    pub fn build(self) -> ActivityExecutor {
        let target_threads = self.config.threads();

        ActivityExecutor {
            config: self.config,
            tally: Arc::new(RunStateTally::new()),
            signals: Arc::new(ActivitySignals::default()),
            pool: Mutex::new(Pool {
                actions: self.actions,
                plan: self.plan,
                input: self.input,
                sink: self.sink,
                limiter: self.limiter,
                context: None,
                started: false,
                target_threads,
                motors: Vec::new(),
                next_slot: 0,
            }),
        }
    }
}

impl fmt::Debug for ActivityExecutorBuilder {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("config", &self.config)
            .field("planned", &self.plan.is_some())
            .field("has_input", &self.input.is_some())
            .field("has_sink", &self.sink.is_some())
            .field("has_limiter", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}
