use std::any::type_name;
use std::fmt;
use std::iter::FusedIterator;
use std::num::NonZero;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::{CycleRange, Error, Result};

/// A contiguous block of cycle numbers claimed by one consumer.
///
/// The segment is owned by whoever claimed it and is consumed in ascending order, either via
/// [`next_cycle()`][Self::next_cycle] or by iterating. It is deliberately not `Clone`: every
/// cycle in it is delivered once.
#[derive(Debug, PartialEq, Eq)]
pub struct CycleSegment {
    recycle: u64,
    next: u64,
    end: u64,
}

impl CycleSegment {
    /// Creates a segment covering `cycles`, issued during recycle pass `recycle`.
    #[must_use]
    pub fn new(recycle: u64, cycles: Range<u64>) -> Self {
        Self {
            recycle,
            next: cycles.start,
            end: cycles.end.max(cycles.start),
        }
    }

    /// Takes the next cycle number, or returns `None` if the segment is exhausted.
    pub fn next_cycle(&mut self) -> Option<u64> {
        let cycle = self.peek_next_cycle()?;
        self.next = self.next.wrapping_add(1);
        Some(cycle)
    }

    /// Returns the cycle number that [`next_cycle()`][Self::next_cycle] would return, without
    /// taking it.
    #[must_use]
    pub fn peek_next_cycle(&self) -> Option<u64> {
        (self.next < self.end).then_some(self.next)
    }

    /// How many cycles have not been taken yet.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next)
    }

    /// Whether every cycle has been taken.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.next >= self.end
    }

    /// The recycle pass this segment was issued in.
    ///
    /// Lets consumers distinguish the first pass over a cycle range from later ones.
    #[must_use]
    pub fn recycle(&self) -> u64 {
        self.recycle
    }
}

impl Iterator for CycleSegment {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.next_cycle()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, usize::try_from(self.remaining()).ok())
    }
}

impl FusedIterator for CycleSegment {}

/// A source of cycle segments shared by all motors of an activity.
///
/// Implementations must never hand out the same cycle twice within a pass, no matter how many
/// threads claim segments concurrently.
pub trait Input: Send + Sync {
    /// Claims up to `length` cycles.
    ///
    /// Returns `None` once every cycle has been claimed. A returned segment is never empty but
    /// may be shorter than `length`.
    fn input_segment(&self, length: NonZero<u64>) -> Option<CycleSegment>;
}

/// Lock-free cycle allocator over a cycle range, optionally repeated for several recycle passes.
///
/// All claimants share a single atomic position that is advanced with a compare-and-swap retry
/// loop, so concurrent claims never overlap and never leave gaps. A segment never spans two
/// recycle passes: the last segment of a pass is shortened instead.
///
/// # Example
///
/// ```
/// use cycle_engine::{AtomicInput, CycleRange, Input};
/// use new_zealand::nz;
///
/// let input = AtomicInput::new(
///     CycleRange::new(10, 15).unwrap(),
///     CycleRange::new(0, 2).unwrap(),
/// )
/// .unwrap();
///
/// let first: Vec<u64> = input.input_segment(nz!(3)).unwrap().collect();
/// assert_eq!(first, [10, 11, 12]);
///
/// // The tail of the first pass is shorter than requested.
/// let second = input.input_segment(nz!(3)).unwrap();
/// assert_eq!(second.recycle(), 0);
/// assert_eq!(second.collect::<Vec<_>>(), [13, 14]);
///
/// let third = input.input_segment(nz!(3)).unwrap();
/// assert_eq!(third.recycle(), 1);
/// assert_eq!(third.collect::<Vec<_>>(), [10, 11, 12]);
/// ```
pub struct AtomicInput {
    cycles: CycleRange,
    recycles: CycleRange,

    /// Total number of cycles across all passes.
    total: u64,

    /// Linear position over all passes: pass `p / span`, offset `p % span`.
    position: AtomicU64,
}

impl AtomicInput {
    /// Creates an allocator that issues `cycles` once for each value in `recycles`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleCountOverflow`] if the total number of cycles across all passes
    /// does not fit in a `u64`.
    pub fn new(cycles: CycleRange, recycles: CycleRange) -> Result<Self> {
        let total = cycles
            .len()
            .get()
            .checked_mul(recycles.len().get())
            .ok_or(Error::CycleCountOverflow)?;

        Ok(Self {
            cycles,
            recycles,
            total,
            position: AtomicU64::new(0),
        })
    }

    /// Creates an allocator that issues `cycles` once.
    #[must_use]
    pub fn single_pass(cycles: CycleRange) -> Self {
        Self {
            cycles,
            recycles: CycleRange::default(),
            total: cycles.len().get(),
            position: AtomicU64::new(0),
        }
    }

    /// The cycle range of each pass.
    #[must_use]
    pub fn cycles(&self) -> CycleRange {
        self.cycles
    }

    /// The recycle passes.
    #[must_use]
    pub fn recycles(&self) -> CycleRange {
        self.recycles
    }

    /// The number of cycles issued over the lifetime of the allocator.
    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total
    }

    /// The number of cycles that have not been claimed yet.
    #[must_use]
    pub fn pending_cycles(&self) -> u64 {
        self.total
            .saturating_sub(self.position.load(Ordering::Relaxed))
    }
}

impl Input for AtomicInput {
    fn input_segment(&self, length: NonZero<u64>) -> Option<CycleSegment> {
        let span = self.cycles.len();

        // Relaxed is enough: the position is the only shared state and it carries no data.
        let mut claimed = self.position.load(Ordering::Relaxed);

        let (start, end) = loop {
            if claimed >= self.total {
                return None;
            }

            let offset = claimed % span;
            let pass_end = claimed
                .wrapping_sub(offset)
                .saturating_add(span.get())
                .min(self.total);
            let end = claimed.saturating_add(length.get()).min(pass_end);

            match self.position.compare_exchange_weak(
                claimed,
                end,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break (claimed, end),
                Err(actual) => claimed = actual,
            }
        };

        let pass = start / span;
        let first = self.cycles.start().wrapping_add(start % span);
        let last = first.wrapping_add(end.wrapping_sub(start));
        let recycle = self.recycles.start().wrapping_add(pass);

        trace!(recycle, first, last, "claimed cycle segment");

        Some(CycleSegment::new(recycle, first..last))
    }
}

impl fmt::Debug for AtomicInput {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("cycles", &self.cycles)
            .field("recycles", &self.recycles)
            .field("total", &self.total)
            .field("pending", &self.pending_cycles())
            .finish()
    }
}
