use std::num::NonZero;

use crate::{CycleResult, CycleResultsSegment, Error, Result};

/// A fixed-capacity, append-only accumulator of cycle results.
///
/// Filled by a single producer, usually the worker that claimed the corresponding segment of
/// cycles. Once it is full or has been [closed][Self::close], further appends are rejected. The
/// contents are released as an immutable [`CycleResultsSegment`] via [`freeze()`][Self::freeze].
#[derive(Debug)]
pub struct CycleSegmentBuffer {
    results: Vec<CycleResult>,
    capacity: NonZero<usize>,
    closed: bool,
}

impl CycleSegmentBuffer {
    /// Creates an empty buffer that accepts up to `capacity` results.
    #[must_use]
    pub fn new(capacity: NonZero<usize>) -> Self {
        Self {
            results: Vec::with_capacity(capacity.get()),
            capacity,
            closed: false,
        }
    }

    /// Appends a result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferClosed`] if the buffer was closed and [`Error::BufferFull`] if it
    /// already holds `capacity` results. The rejected result is dropped.
    pub fn append(&mut self, result: CycleResult) -> Result<()> {
        if self.closed {
            return Err(Error::BufferClosed);
        }

        if self.is_full() {
            return Err(Error::BufferFull {
                capacity: self.capacity.get(),
            });
        }

        self.results.push(result);
        Ok(())
    }

    /// Stops accepting results. Results already appended are kept.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Whether the buffer has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the buffer holds `capacity` results.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.results.len() >= self.capacity.get()
    }

    /// The number of results appended so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether no results have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The maximum number of results the buffer accepts.
    #[must_use]
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// How many more results the buffer accepts before it is full.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity.get().saturating_sub(self.results.len())
    }

    /// Releases the appended results, in append order, as an immutable segment.
    #[must_use]
    pub fn freeze(self) -> CycleResultsSegment {
        CycleResultsSegment::from(self.results)
    }
}
