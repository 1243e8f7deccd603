//! Integration tests for `cycle_engine`.
//!
//! These run whole activities on real motor threads and check what a workload runner relies on:
//! every cycle runs exactly once across resizes and restarts, failures are isolated or surfaced
//! as appropriate and waiting for completion behaves under timeouts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cycle_engine::{
    Action, ActivityConfig, ActivityExecutor, AtomicInput, ChannelResultSink, CycleOp, CycleRange,
    Error, FATAL_RESULT_CODE, FatalError, FixedRateLimiter, OpDispenser, OpFailure,
    OpSequenceActions, RunState,
};
use cycle_results::{CycleResult, CycleResultsSegment, ResultCode, SUCCESS};
use new_zealand::nz;
use op_sequence::{OpSequence, SequencePlanner, SequencerType, SharedOpSequence};
use parking_lot::Mutex;
use testing::{CycleLog, Latch, with_watchdog};

const LONG: Duration = Duration::from_secs(30);

fn config(cycles: u64, threads: usize, stride: u64) -> ActivityConfig {
    ActivityConfig::builder()
        .alias("test")
        .cycles(CycleRange::with_count(cycles.try_into().unwrap()))
        .threads(threads.try_into().unwrap())
        .stride(stride.try_into().unwrap())
        .build()
}

type BoxedAction = Box<dyn FnMut(u64) -> Result<ResultCode, FatalError> + Send>;

fn logging_actions(log: &Arc<CycleLog>) -> impl Fn(usize) -> BoxedAction + Send + Sync + use<> {
    let log = Arc::clone(log);

    move |_slot| -> BoxedAction {
        let log = Arc::clone(&log);
        Box::new(move |cycle: u64| {
            log.record(cycle);
            Ok(SUCCESS)
        })
    }
}

fn all_results(sink: &ChannelResultSink) -> Vec<CycleResult> {
    let mut results: Vec<_> = sink
        .drain()
        .iter()
        .flat_map(CycleResultsSegment::iter)
        .copied()
        .collect();
    results.sort_by_key(CycleResult::cycle);
    results
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn every_cycle_runs_exactly_once() {
    with_watchdog(|| {
        let log = Arc::new(CycleLog::new());
        let sink = Arc::new(ChannelResultSink::new());

        let executor = ActivityExecutor::builder(config(10_000, 8, 7), logging_actions(&log))
            .sink(Arc::clone(&sink))
            .build();

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        log.assert_exactly_once(0, 10_000);
        assert_eq!(executor.run_state_summary(), "FFFFFFFF");

        let results = all_results(&sink);
        assert_eq!(results.len(), 10_000);
        assert!(results.iter().all(CycleResult::is_success));
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn resizing_while_running_keeps_exactly_once() {
    with_watchdog(|| {
        let log = Arc::new(CycleLog::new());

        let actions = {
            let log = Arc::clone(&log);
            move |_slot: usize| {
                let log = Arc::clone(&log);
                move |cycle: u64| {
                    log.record(cycle);
                    thread::sleep(Duration::from_micros(20));
                    Ok::<_, FatalError>(SUCCESS)
                }
            }
        };

        let executor = ActivityExecutor::new(config(20_000, 5, 10), actions);
        executor.start_activity().unwrap();

        thread::sleep(Duration::from_millis(20));
        executor.set_thread_count(nz!(2)).unwrap();
        assert_eq!(executor.run_state_summary().len(), 2);

        thread::sleep(Duration::from_millis(20));
        executor.set_thread_count(nz!(8)).unwrap();
        assert_eq!(executor.thread_count().get(), 8);

        assert!(executor.await_completion(LONG).unwrap());

        log.assert_exactly_once(0, 20_000);
        assert_eq!(executor.tally().image().count(RunState::Finished), 8);
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn failed_cycles_are_recorded_and_the_activity_continues() {
    with_watchdog(|| {
        let sink = Arc::new(ChannelResultSink::new());

        let executor = ActivityExecutor::builder(config(500, 3, 16), |_slot: usize| {
            |cycle: u64| Ok::<_, FatalError>(if cycle % 100 == 42 { 3 } else { SUCCESS })
        })
        .sink(Arc::clone(&sink))
        .build();

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        let results = all_results(&sink);
        assert_eq!(results.len(), 500);

        let failed: Vec<_> = results
            .iter()
            .filter(|result| !result.is_success())
            .map(|result| (result.cycle(), result.result()))
            .collect();
        assert_eq!(failed, [(42, 3), (142, 3), (242, 3), (342, 3), (442, 3)]);
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn fatal_error_stops_every_motor_and_is_reported() {
    with_watchdog(|| {
        let executed = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(ChannelResultSink::new());

        let actions = {
            let executed = Arc::clone(&executed);
            move |_slot: usize| {
                let executed = Arc::clone(&executed);
                move |cycle: u64| {
                    executed.fetch_add(1, Ordering::Relaxed);

                    if cycle == 500 {
                        return Err(FatalError::new("connection lost"));
                    }

                    thread::sleep(Duration::from_micros(50));
                    Ok(SUCCESS)
                }
            }
        };

        let executor = ActivityExecutor::builder(config(1_000_000, 4, 10), actions)
            .sink(Arc::clone(&sink))
            .build();
        executor.start_activity().unwrap();

        let error = executor.await_completion(LONG).unwrap_err();
        assert!(
            matches!(
                error,
                Error::MotorErrored { ref message, .. } if message == "connection lost"
            ),
            "{error}"
        );

        // The remaining motors stop after their in-flight cycle.
        let image = executor.tally().await_none_other(&RunState::TERMINAL, LONG);
        assert!(!image.is_timed_out());
        assert_eq!(image.total(), 4);
        assert!(executor.run_state_summary().contains('E'));
        assert!(executed.load(Ordering::Relaxed) < 1_000_000);

        let fatal = all_results(&sink)
            .into_iter()
            .find(|result| result.cycle() == 500)
            .unwrap();
        assert_eq!(fatal.result(), FATAL_RESULT_CODE);

        assert!(matches!(
            executor.stop_activity(),
            Err(Error::MotorErrored { .. })
        ));
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn await_times_out_while_a_cycle_blocks() {
    with_watchdog(|| {
        let latch = Arc::new(Latch::new());

        let actions = {
            let latch = Arc::clone(&latch);
            move |_slot: usize| {
                let latch = Arc::clone(&latch);
                move |cycle: u64| {
                    if cycle == 0 {
                        latch.wait();
                    }
                    Ok::<_, FatalError>(SUCCESS)
                }
            }
        };

        let executor = ActivityExecutor::new(config(100, 2, 1), actions);
        executor.start_activity().unwrap();

        assert!(latch.wait_for_waiters(1, LONG));
        assert!(!executor.await_completion(Duration::from_millis(10)).unwrap());

        let image = executor.tally().image();
        assert_eq!(image.count(RunState::Running), 1);

        latch.open();

        assert!(executor.await_completion(Duration::MAX).unwrap());
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn restart_resumes_from_unclaimed_cycles() {
    with_watchdog(|| {
        let log = Arc::new(CycleLog::new());

        let actions = {
            let log = Arc::clone(&log);
            move |_slot: usize| {
                let log = Arc::clone(&log);
                move |cycle: u64| {
                    log.record(cycle);
                    thread::sleep(Duration::from_micros(200));
                    Ok::<_, FatalError>(SUCCESS)
                }
            }
        };

        // A stride of one leaves nothing claimed but unexecuted when stopping.
        let executor = ActivityExecutor::new(config(1_000, 2, 1), actions);

        executor.start_activity().unwrap();
        thread::sleep(Duration::from_millis(20));
        executor.stop_activity().unwrap();

        assert!(!executor.is_started());
        assert_eq!(executor.run_state_summary(), "XX");
        let executed_before_restart = log.total();
        assert!(executed_before_restart < 1_000);

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        log.assert_exactly_once(0, 1_000);
        assert_eq!(executor.run_state_summary(), "FF");
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn failing_init_fails_start() {
    struct NoConnection;

    impl Action for NoConnection {
        fn init(&mut self) -> Result<(), FatalError> {
            Err(FatalError::new("refused"))
        }

        fn run_cycle(&mut self, _cycle: u64) -> Result<ResultCode, FatalError> {
            Ok(SUCCESS)
        }
    }

    with_watchdog(|| {
        let executor = ActivityExecutor::new(config(10, 2, 1), |_slot: usize| NoConnection);

        let error = executor.start_activity().unwrap_err();
        assert!(matches!(error, Error::MotorErrored { ref message, .. } if message == "refused"));
        assert_eq!(executor.run_state_summary(), "EE");
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn start_can_be_retried_after_init_fails() {
    struct FlakyInit {
        inits: Arc<AtomicUsize>,
        log: Arc<CycleLog>,
    }

    impl Action for FlakyInit {
        fn init(&mut self) -> Result<(), FatalError> {
            if self.inits.fetch_add(1, Ordering::Relaxed) == 0 {
                return Err(FatalError::new("backend down"));
            }

            Ok(())
        }

        fn run_cycle(&mut self, cycle: u64) -> Result<ResultCode, FatalError> {
            self.log.record(cycle);
            Ok(SUCCESS)
        }
    }

    with_watchdog(|| {
        let inits = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(CycleLog::new());

        let actions = {
            let inits = Arc::clone(&inits);
            let log = Arc::clone(&log);
            move |_slot: usize| FlakyInit {
                inits: Arc::clone(&inits),
                log: Arc::clone(&log),
            }
        };

        let executor = ActivityExecutor::new(config(10, 1, 1), actions);

        let error = executor.start_activity().unwrap_err();
        assert!(
            matches!(error, Error::MotorErrored { ref message, .. } if message == "backend down")
        );
        assert!(!executor.is_started());

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        assert_eq!(inits.load(Ordering::Relaxed), 2);
        log.assert_exactly_once(0, 10);
        assert_eq!(executor.run_state_summary(), "F");
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn executor_can_be_inspected_while_motors_initialize() {
    struct GatedInit(Arc<Latch>);

    impl Action for GatedInit {
        fn init(&mut self) -> Result<(), FatalError> {
            self.0.wait();
            Ok(())
        }

        fn run_cycle(&mut self, _cycle: u64) -> Result<ResultCode, FatalError> {
            Ok(SUCCESS)
        }
    }

    with_watchdog(|| {
        let latch = Arc::new(Latch::new());

        let actions = {
            let latch = Arc::clone(&latch);
            move |_slot: usize| GatedInit(Arc::clone(&latch))
        };

        let executor = ActivityExecutor::new(config(10, 1, 1), actions);

        thread::scope(|scope| {
            let starting = scope.spawn(|| executor.start_activity());

            assert!(latch.wait_for_waiters(1, LONG));
            assert!(executor.is_started());
            assert_eq!(executor.run_state_summary(), "s");
            assert_eq!(executor.thread_count().get(), 1);

            latch.open();
            starting.join().unwrap().unwrap();
        });

        assert!(executor.await_completion(LONG).unwrap());
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn planned_operations_use_configured_sequencer() {
    with_watchdog(|| {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let labeled = |label| Labeled {
            label,
            seen: Arc::clone(&seen),
            gate: None,
        };

        // The planner's own sequencer is replaced by the configured one.
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        planner.add_op(labeled("a"), 2).add_op(labeled("b"), 1);

        let config = ActivityConfig::from_toml_str(
            r#"
            cycles = 6
            threads = 1
            seq = "concat"
            "#,
        )
        .unwrap();

        let executor = ActivityExecutor::planned(config, planner).build();
        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        let mut seen = seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(
            seen,
            [(0, "a"), (1, "a"), (2, "b"), (3, "a"), (4, "a"), (5, "b")]
        );
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn unsequenceable_plan_fails_start() {
    with_watchdog(|| {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut planner = SequencePlanner::new(SequencerType::Interval);
        planner.add_op(
            Labeled {
                label: "disabled",
                seen: Arc::clone(&seen),
                gate: None,
            },
            0,
        );

        let executor = ActivityExecutor::planned(config(10, 2, 1), planner).build();

        let error = executor.start_activity().unwrap_err();
        assert!(matches!(error, Error::Sequence(_)), "{error}");
        assert_eq!(executor.tally().image().total(), 0);
        assert!(seen.lock().is_empty());
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn recycles_repeat_the_cycle_range() {
    with_watchdog(|| {
        let config = ActivityConfig::from_toml_str(
            r#"
            alias = "recycled"
            cycles = "100..400"
            recycles = 3
            threads = 3
            stride = 16
            "#,
        )
        .unwrap();

        let sink = Arc::new(ChannelResultSink::new());
        let executor = ActivityExecutor::builder(config, |_slot: usize| {
            |_cycle: u64| Ok::<_, FatalError>(SUCCESS)
        })
        .sink(Arc::clone(&sink))
        .build();

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        let results = all_results(&sink);
        assert_eq!(results.len(), 900);
        assert_eq!(results.first().unwrap().cycle(), 100);
        assert_eq!(results.last().unwrap().cycle(), 399);

        // Each cycle ran once per recycle.
        for window in results.chunks(3) {
            assert!(window.iter().all(|result| result.cycle() == window[0].cycle()));
        }
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn custom_input_is_drained() {
    with_watchdog(|| {
        let input = Arc::new(
            AtomicInput::new(CycleRange::new(0, 50).unwrap(), CycleRange::new(0, 2).unwrap())
                .unwrap(),
        );
        let log = Arc::new(CycleLog::new());

        let executor = ActivityExecutor::builder(config(1, 2, 4), logging_actions(&log))
            .input(Arc::clone(&input))
            .build();

        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        assert_eq!(input.pending_cycles(), 0);
        assert_eq!(log.total(), 100);
        assert_eq!(log.distinct(), 50);
    });
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn limiter_paces_cycles() {
    with_watchdog(|| {
        let sink = Arc::new(ChannelResultSink::new());

        let executor = ActivityExecutor::builder(config(50, 2, 5), |_slot: usize| {
            |_cycle: u64| Ok::<_, FatalError>(SUCCESS)
        })
        .sink(Arc::clone(&sink))
        .limiter(Arc::new(FixedRateLimiter::per_second(nz!(1000))))
        .build();

        let started = Instant::now();
        executor.start_activity().unwrap();
        assert!(executor.await_completion(LONG).unwrap());

        // 50 cycles at one per millisecond, the first admitted immediately.
        assert!(started.elapsed() >= Duration::from_millis(45));

        let results = all_results(&sink);
        assert!(results.iter().any(|result| !result.scheduling_delay().is_zero()));
    });
}

#[derive(Debug)]
struct Labeled {
    label: &'static str,
    seen: Arc<Mutex<Vec<(u64, &'static str)>>>,
    gate: Option<(u64, Arc<Latch>)>,
}

struct LabeledOp {
    label: &'static str,
    seen: Arc<Mutex<Vec<(u64, &'static str)>>>,
    gate: Option<Arc<Latch>>,
}

impl CycleOp for LabeledOp {
    fn execute(&mut self, cycle: u64) -> Result<(), OpFailure> {
        if let Some(gate) = &self.gate {
            gate.wait();
        }

        self.seen.lock().push((cycle, self.label));
        Ok(())
    }
}

impl OpDispenser for Labeled {
    type Op = LabeledOp;

    fn apply(&self, cycle: u64) -> Result<LabeledOp, FatalError> {
        Ok(LabeledOp {
            label: self.label,
            seen: Arc::clone(&self.seen),
            gate: self
                .gate
                .as_ref()
                .filter(|(gated_cycle, _)| *gated_cycle == cycle)
                .map(|(_, latch)| Arc::clone(latch)),
        })
    }

    fn name(&self) -> &str {
        self.label
    }
}

#[test]
#[cfg_attr(miri, ignore = "spawns threads")]
fn operation_mix_can_be_swapped_while_running() {
    with_watchdog(|| {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let latch = Arc::new(Latch::new());

        let initial = OpSequence::from_ratios(
            SequencerType::Bucket,
            vec![Labeled {
                label: "before",
                seen: Arc::clone(&seen),
                gate: Some((100, Arc::clone(&latch))),
            }],
            &[1],
        )
        .unwrap();

        let actions = OpSequenceActions::new(SharedOpSequence::new(initial), nz!(1));
        let ops = actions.ops().clone();

        let executor = ActivityExecutor::new(config(200, 1, 1), actions);
        executor.start_activity().unwrap();

        assert!(latch.wait_for_waiters(1, LONG));

        let replacement = OpSequence::from_ratios(
            SequencerType::Bucket,
            vec![Labeled {
                label: "after",
                seen: Arc::clone(&seen),
                gate: None,
            }],
            &[1],
        )
        .unwrap();
        ops.swap(replacement);
        latch.open();

        assert!(executor.await_completion(LONG).unwrap());

        let seen = seen.lock();
        assert_eq!(seen.len(), 200);
        for &(cycle, label) in seen.iter() {
            let expected = if cycle <= 100 { "before" } else { "after" };
            assert_eq!(label, expected, "cycle {cycle}");
        }
    });
}
