#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Capture and batching of per-cycle outcomes for cycle-driven workloads.
//!
//! A worker executing cycle `n` records what happened in a [`MutableCycleResult`]: it is started
//! immediately before the operation runs and completed immediately after, yielding an immutable
//! [`CycleResult`] that carries the cycle number, an integer [`ResultCode`] (zero for success),
//! the start and end instants and any scheduling delay the cycle incurred before it could start.
//!
//! Completed results are moved into a fixed-capacity [`CycleSegmentBuffer`], typically one per
//! claimed segment of cycles. Once the segment is done, the buffer is frozen into a read-only
//! [`CycleResultsSegment`] that reporting code can iterate, filter and summarize.
//!
//! # Example
//!
//! ```
//! use std::num::NonZero;
//! use std::time::Duration;
//!
//! use cycle_results::{CycleSegmentBuffer, MutableCycleResult};
//!
//! let mut buffer = CycleSegmentBuffer::new(NonZero::new(3).unwrap());
//!
//! for cycle in 100..103 {
//!     let pending = MutableCycleResult::start(cycle, Duration::ZERO);
//!     // ... execute the operation for `cycle` here ...
//!     let code = if cycle == 101 { 7 } else { 0 };
//!     buffer.append(pending.complete(code)).unwrap();
//! }
//!
//! assert!(buffer.is_full());
//!
//! let segment = buffer.freeze();
//! assert_eq!(segment.first_cycle(), Some(100));
//! assert_eq!(segment.last_cycle(), Some(102));
//!
//! let failures = segment.failures();
//! assert_eq!(failures.len(), 1);
//! assert_eq!(failures.iter().next().unwrap().cycle(), 101);
//! ```

mod buffer;
mod error;
mod result;
mod segment;

pub use buffer::*;
pub use error::*;
pub use result::*;
pub use segment::*;
