#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Concurrent dispatch of numbered cycles to a resizable pool of worker threads.
//!
//! An *activity* is a workload defined as a range of cycle numbers, each of which is executed
//! once per *recycle*. An [`ActivityExecutor`] runs the activity on a pool of *motors*, one
//! thread each. Motors claim contiguous segments of cycles from a shared [`Input`], execute
//! every cycle of the segment through their own [`Action`] and hand the per-cycle results to a
//! [`ResultSink`].
//!
//! Every cycle of every recycle is claimed by exactly one motor, however many motors there are
//! and however often the pool is resized while it runs.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cycle_engine::{ActivityConfig, ActivityExecutor, ChannelResultSink, FatalError};
//! use new_zealand::nz;
//!
//! let config = ActivityConfig::builder()
//!     .alias("demo")
//!     .cycles("0..100".parse()?)
//!     .threads(nz!(4))
//!     .stride(nz!(10))
//!     .build();
//!
//! let sink = Arc::new(ChannelResultSink::new());
//!
//! // One action per motor. Odd cycles report result code 1.
//! let executor = ActivityExecutor::builder(config, |_slot: usize| {
//!     |cycle: u64| Ok::<_, FatalError>(i32::from(cycle % 2 == 1))
//! })
//! .sink(Arc::clone(&sink))
//! .build();
//!
//! executor.start_activity()?;
//! assert!(executor.await_completion(Duration::from_secs(60))?);
//!
//! let results: Vec<_> = sink.drain();
//! let failures: usize = results.iter().map(|segment| segment.failures().len()).sum();
//! assert_eq!(failures, 50);
//! # Ok::<(), cycle_engine::Error>(())
//! ```
//!
//! # Operation mixes
//!
//! Workloads made of several operation types are usually driven through
//! [`OpSequenceActions`], which resolves each cycle to an operation via an
//! [`op_sequence::OpSequence`], retries retryable failures and records result codes.
//!
//! # Lifecycle
//!
//! Each motor moves through the [`RunState`] lifecycle. The executor tracks all motors in a
//! [`RunStateTally`], so callers can wait for conditions such as "every motor is done" without
//! polling.
//!
//! A fatal error in any motor stops all motors of the activity after their in-flight cycle and
//! is reported by [`ActivityExecutor::await_completion()`].
//!
//! # Metrics
//!
//! Motors record `nm` events for executed and failed cycles, cycle service time and claimed
//! segment lengths. Collect them with `nm::Report::collect()`.

mod action;
mod config;
mod error;
mod executor;
mod input;
mod limiter;
mod metrics;
mod motor;
mod range;
mod run_state;
mod sink;
mod tally;

pub use action::*;
pub use config::*;
pub use error::*;
pub use executor::*;
pub use input::*;
pub use limiter::*;
pub use motor::FATAL_RESULT_CODE;
pub use range::*;
pub use run_state::*;
pub use sink::*;
pub use tally::*;
