#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Deterministic ratio-based sequencing of operations for cycle-driven workloads.
//!
//! A workload is a list of operation templates, each with an integer ratio that expresses how
//! often it should be executed relative to the others. This package turns such a list into a
//! fixed index array (the *sequence*) once, after which any cycle number resolves to an
//! operation in constant time without allocating:
//!
//! ```text
//! element = elements[sequence[cycle % sequence.len()]]
//! ```
//!
//! # Sequencers
//!
//! Three deterministic algorithms are available via [`SequencerType`]:
//!
//! * [`SequencerType::Bucket`] - round-robin passes over the elements, interleaving maximally.
//! * [`SequencerType::Interval`] - places each element at its ideal equidistant positions so that
//!   no element's occurrences cluster together.
//! * [`SequencerType::Concat`] - emits all occurrences of each element in turn, grouping instead
//!   of mixing.
//!
//! Every sequencer emits element `i` exactly `ratios[i]` times, so the sequence length is always
//! the sum of the ratios.
//!
//! # Example
//!
//! ```
//! use op_sequence::{SequencePlanner, SequencerType};
//!
//! let mut planner = SequencePlanner::new(SequencerType::Bucket);
//! planner.add_op("read", 4).add_op("write", 3);
//!
//! let sequence = planner.resolve().unwrap();
//!
//! assert_eq!(sequence.len().get(), 7);
//! assert_eq!(*sequence.get(0), "read");
//! assert_eq!(*sequence.get(1), "write");
//!
//! // Resolution is periodic in the sequence length.
//! assert_eq!(sequence.get(3), sequence.get(3 + 7 * 1000));
//! ```
//!
//! # Changing the operation mix at runtime
//!
//! An [`OpSequence`] is immutable. To change the mix while workers are resolving cycles, build a
//! new sequence and publish it through a [`SharedOpSequence`], which swaps the reference
//! atomically. Readers holding the old sequence finish with it undisturbed.
//!
//! ```
//! use op_sequence::{OpSequence, SequencerType, SharedOpSequence};
//!
//! let initial = OpSequence::from_ratios(SequencerType::Concat, vec!["a", "b"], &[1, 1]).unwrap();
//! let shared = SharedOpSequence::new(initial);
//!
//! assert_eq!(*shared.load().get(1), "b");
//!
//! let replacement = OpSequence::from_ratios(SequencerType::Concat, vec!["c"], &[1]).unwrap();
//! shared.swap(replacement);
//!
//! assert_eq!(*shared.load().get(1), "c");
//! ```

mod error;
mod planner;
mod sequence;
mod sequencer;
mod shared;

pub use error::*;
pub use planner::*;
pub use sequence::*;
pub use sequencer::*;
pub use shared::*;
