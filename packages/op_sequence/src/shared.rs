use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};

use crate::OpSequence;

/// A shared, atomically replaceable reference to an [`OpSequence`].
///
/// Every clone of the handle observes the same current sequence. Readers call
/// [`load()`][Self::load] for each cycle (or batch of cycles) and always see either the old or
/// the new sequence in full, never a mix. Publishing a replacement with
/// [`swap()`][Self::swap] does not wait for readers of the previous sequence; they keep using it
/// until they drop their guard.
///
/// # Example
///
/// ```
/// use std::thread;
///
/// use op_sequence::{OpSequence, SequencerType, SharedOpSequence};
///
/// let shared = SharedOpSequence::new(
///     OpSequence::from_ratios(SequencerType::Bucket, vec!["read"], &[1]).unwrap(),
/// );
///
/// let reader = shared.clone();
/// thread::spawn(move || {
///     let current = reader.load();
///     assert!(["read", "write"].contains(current.get(0)));
/// })
/// .join()
/// .unwrap();
///
/// shared.swap(OpSequence::from_ratios(SequencerType::Bucket, vec!["write"], &[1]).unwrap());
/// ```
pub struct SharedOpSequence<T> {
    current: Arc<ArcSwap<OpSequence<T>>>,
}

impl<T> SharedOpSequence<T> {
    /// Creates a handle that initially refers to `sequence`.
    #[must_use]
    pub fn new(sequence: OpSequence<T>) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(sequence)),
        }
    }

    /// Loads the current sequence for a short-lived read.
    ///
    /// The guard is cheap to obtain and is intended to be held for the duration of a single
    /// cycle or segment. Use [`load_full()`][Self::load_full] to keep a sequence longer.
    #[must_use]
    #[inline]
    pub fn load(&self) -> Guard<Arc<OpSequence<T>>> {
        self.current.load()
    }

    /// Loads the current sequence as an owned reference.
    #[must_use]
    pub fn load_full(&self) -> Arc<OpSequence<T>> {
        self.current.load_full()
    }

    /// Publishes a new sequence, returning the one it replaced.
    pub fn swap(&self, sequence: OpSequence<T>) -> Arc<OpSequence<T>> {
        self.current.swap(Arc::new(sequence))
    }
}

impl<T> Clone for SharedOpSequence<T> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedOpSequence<T> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("current", &self.current.load())
            .finish()
    }
}

impl<T> From<OpSequence<T>> for SharedOpSequence<T> {
    fn from(sequence: OpSequence<T>) -> Self {
        Self::new(sequence)
    }
}
