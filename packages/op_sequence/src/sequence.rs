use std::num::NonZero;
use std::sync::Arc;

use crate::{Error, Result, SequencerType};

/// An immutable mapping from cycle numbers to elements.
///
/// Resolution is `elements[sequence[cycle % sequence.len()]]`, which is constant time and does
/// not allocate. Both the element list and the index array are fixed at construction. To change
/// the mix of elements, build a new `OpSequence` and publish it via
/// [`SharedOpSequence`][crate::SharedOpSequence].
///
/// The index array is reference-counted, so [`transform()`][Self::transform] can produce a
/// sequence of a different element type without copying or recomputing it.
///
/// # Example
///
/// ```
/// use op_sequence::{OpSequence, SequencerType};
///
/// let sequence =
///     OpSequence::from_ratios(SequencerType::Interval, vec!["a", "b"], &[2, 1]).unwrap();
///
/// let names = sequence.transform(|name| name.to_uppercase());
///
/// assert_eq!(names.get(0), "A");
/// assert_eq!(names.get(1), "B");
/// assert_eq!(names.get(2), "A");
/// assert_eq!(names.get(3), "A");
/// ```
#[derive(Clone, Debug)]
pub struct OpSequence<T> {
    elements: Vec<T>,
    sequence: Arc<[usize]>,
}

impl<T> OpSequence<T> {
    /// Creates a sequence from an element list and a precomputed index array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoElements`] if the index array is empty and
    /// [`Error::IndexOutOfBounds`] if it refers to an element that does not exist.
    pub fn new(elements: Vec<T>, sequence: impl Into<Arc<[usize]>>) -> Result<Self> {
        let sequence = sequence.into();

        if sequence.is_empty() {
            return Err(Error::NoElements);
        }

        if let Some(&index) = sequence.iter().find(|&&index| index >= elements.len()) {
            return Err(Error::IndexOutOfBounds {
                index,
                elements: elements.len(),
            });
        }

        Ok(Self { elements, sequence })
    }

    /// Sequences `elements` according to `ratios` using the given sequencer.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequencer rejects the ratios or if the resulting sequence is
    /// empty (no elements at all).
    pub fn from_ratios(sequencer: SequencerType, elements: Vec<T>, ratios: &[u64]) -> Result<Self> {
        let sequence = sequencer.seq_indexes_by_ratios(&elements, ratios)?;

        Self::new(elements, sequence)
    }

    /// Resolves a cycle number to its element.
    #[must_use]
    #[inline]
    pub fn get(&self, cycle: u64) -> &T {
        // The sequence length always fits in u64 and the remainder is below it, so both
        // conversions are lossless.
        let position = usize::try_from(cycle % self.sequence.len() as u64)
            .expect("remainder is less than the sequence length, which is a usize");

        let index = *self
            .sequence
            .get(position)
            .expect("position is less than the sequence length");

        self.elements
            .get(index)
            .expect("all indexes were validated against the element list at construction")
    }

    /// The length of the index array, which is the period after which resolution repeats.
    #[must_use]
    pub fn len(&self) -> NonZero<usize> {
        NonZero::new(self.sequence.len()).expect("empty sequences are rejected at construction")
    }

    /// The distinct elements, in declaration order.
    #[must_use]
    pub fn elements(&self) -> &[T] {
        &self.elements
    }

    /// The index array that maps sequence positions to elements.
    #[must_use]
    pub fn sequence(&self) -> &[usize] {
        &self.sequence
    }

    /// Maps every element to a new representation, keeping the same index array.
    ///
    /// The index array is shared between the two sequences rather than copied.
    #[must_use]
    pub fn transform<U, F>(&self, f: F) -> OpSequence<U>
    where
        F: FnMut(&T) -> U,
    {
        OpSequence {
            elements: self.elements.iter().map(f).collect(),
            sequence: Arc::clone(&self.sequence),
        }
    }

    /// Like [`transform()`][Self::transform] but with a fallible mapping function.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `f`.
    pub fn try_transform<U, E, F>(&self, f: F) -> std::result::Result<OpSequence<U>, E>
    where
        F: FnMut(&T) -> std::result::Result<U, E>,
    {
        Ok(OpSequence {
            elements: self
                .elements
                .iter()
                .map(f)
                .collect::<std::result::Result<_, _>>()?,
            sequence: Arc::clone(&self.sequence),
        })
    }
}
