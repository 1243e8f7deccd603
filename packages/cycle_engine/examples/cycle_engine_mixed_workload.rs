//! Runs a read-heavy mix of simulated operations on a resizable pool of motors and prints a
//! summary of the results and the collected metrics.
//!
//! Every 25th write fails with a retryable error that succeeds on the next attempt, and every
//! 1000th read reports a "not found" result code without retrying.

use std::num::NonZero;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cycle_engine::{
    ActivityConfig, ActivityExecutor, ChannelResultSink, CycleOp, FatalError, OpDispenser,
    OpFailure,
};
use cycle_results::CycleResultsSegment;
use new_zealand::nz;
use nm::Report;
use op_sequence::SequencePlanner;

const NOT_FOUND: NonZero<i32> = nz!(4);
const CONFLICT: NonZero<i32> = nz!(9);

#[derive(Debug)]
enum Template {
    Read,
    Write,
}

struct SimulatedOp {
    template: &'static Template,
    attempts: u32,
}

impl CycleOp for SimulatedOp {
    fn execute(&mut self, cycle: u64) -> Result<(), OpFailure> {
        self.attempts = self.attempts.saturating_add(1);
        thread::sleep(Duration::from_micros(20));

        match self.template {
            Template::Read if cycle % 1000 == 0 => Err(OpFailure::failed(NOT_FOUND)),
            Template::Write if cycle % 25 == 0 && self.attempts == 1 => {
                Err(OpFailure::retryable(CONFLICT))
            }
            _ => Ok(()),
        }
    }
}

impl OpDispenser for &'static Template {
    type Op = SimulatedOp;

    fn apply(&self, _cycle: u64) -> Result<SimulatedOp, FatalError> {
        Ok(SimulatedOp {
            template: *self,
            attempts: 0,
        })
    }

    fn name(&self) -> &str {
        match self {
            Template::Read => "read",
            Template::Write => "write",
        }
    }
}

fn main() -> Result<(), cycle_engine::Error> {
    let config = ActivityConfig::from_toml_str(
        r#"
        alias = "mixed"
        cycles = "20K"
        threads = 2
        stride = 100
        maxtries = 3
        seq = "interval"
        "#,
    )?;

    // Sequenced on start with the configured "interval" sequencer.
    let mut planner = SequencePlanner::new(config.sequencer());
    planner.add_op(&Template::Read, 4).add_op(&Template::Write, 1);

    let sink = Arc::new(ChannelResultSink::new());

    let executor = ActivityExecutor::planned(config, planner)
        .sink(Arc::clone(&sink))
        .build();

    executor.start_activity()?;
    println!("started: {}", executor.run_state_summary());

    thread::sleep(Duration::from_millis(50));
    executor.set_thread_count(nz!(6))?;
    println!("resized: {}", executor.run_state_summary());

    executor.await_completion(Duration::MAX)?;
    println!("done:    {}", executor.run_state_summary());

    let segments = sink.drain();
    let executed: usize = segments.iter().map(CycleResultsSegment::len).sum();
    let not_found: usize = segments
        .iter()
        .filter_map(|segment| segment.count_by_result().get(&NOT_FOUND.get()).copied())
        .sum();

    println!("executed {executed} cycles, {not_found} reads found nothing");

    let report = Report::collect();
    println!("{report}");

    Ok(())
}
