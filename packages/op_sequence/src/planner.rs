use tracing::debug;

use crate::{Error, OpSequence, Result, SequencerType};

/// Collects weighted operations and resolves them into an [`OpSequence`].
///
/// Operations with a ratio of zero are accepted but left out of the plan, so a workload can
/// disable an operation by setting its ratio to zero without removing it.
///
/// # Example
///
/// ```
/// use op_sequence::{SequencePlanner, SequencerType};
///
/// let mut planner = SequencePlanner::new(SequencerType::Concat);
/// planner
///     .add_op("insert", 2)
///     .add_op("disabled", 0)
///     .add_op("select", 1);
///
/// let sequence = planner.resolve().unwrap();
///
/// assert_eq!(sequence.elements(), ["insert", "select"]);
/// assert_eq!(sequence.sequence(), [0, 0, 1]);
/// ```
#[derive(Debug)]
pub struct SequencePlanner<T> {
    sequencer: SequencerType,
    elements: Vec<T>,
    ratios: Vec<u64>,
}

impl<T> SequencePlanner<T> {
    /// Creates an empty planner that will use the given sequencer.
    #[must_use]
    pub fn new(sequencer: SequencerType) -> Self {
        Self {
            sequencer,
            elements: Vec::new(),
            ratios: Vec::new(),
        }
    }

    /// The sequencer this planner resolves with.
    #[must_use]
    pub fn sequencer(&self) -> SequencerType {
        self.sequencer
    }

    /// Replaces the sequencer this planner resolves with.
    pub fn set_sequencer(&mut self, sequencer: SequencerType) -> &mut Self {
        self.sequencer = sequencer;
        self
    }

    /// Adds an operation to the plan with the given ratio.
    ///
    /// A ratio of zero excludes the operation from the plan.
    pub fn add_op(&mut self, element: T, ratio: u64) -> &mut Self {
        if ratio == 0 {
            debug!(
                position = self.elements.len(),
                "skipping operation with ratio 0"
            );
            return self;
        }

        self.elements.push(element);
        self.ratios.push(ratio);
        self
    }

    /// The number of operations that will take part in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether no operations with a nonzero ratio have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Checks that the plan can be resolved, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`resolve()`][Self::resolve].
    pub fn check(&self) -> Result<()> {
        if self.elements.is_empty() {
            return Err(Error::NoElements);
        }

        self.ratios
            .iter()
            .try_fold(0_u64, |sum, &ratio| sum.checked_add(ratio))
            .and_then(|sum| usize::try_from(sum).ok())
            .map(|_| ())
            .ok_or(Error::RatioOverflow)
    }

    /// Sequences the planned operations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoElements`] if no operation with a nonzero ratio was added, or
    /// [`Error::RatioOverflow`] if the ratios sum to more than can be materialized.
    pub fn resolve(self) -> Result<OpSequence<T>> {
        self.check()?;

        let sequence = self
            .sequencer
            .seq_indexes_by_ratios(&self.elements, &self.ratios)?;

        debug!(
            sequencer = self.sequencer.name(),
            operations = self.elements.len(),
            length = sequence.len(),
            "resolved operation sequence"
        );

        OpSequence::new(self.elements, sequence)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn resolves_with_selected_sequencer() {
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        planner.add_op("O", 4).add_op("I", 3);

        assert_eq!(planner.sequencer(), SequencerType::Bucket);
        assert_eq!(planner.len(), 2);

        let sequence = planner.resolve().unwrap();
        let resolved: Vec<_> = (0..7).map(|cycle| *sequence.get(cycle)).collect();

        assert_eq!(resolved, ["O", "I", "O", "I", "O", "I", "O"]);
    }

    #[test]
    fn zero_ratio_ops_are_skipped() {
        let mut planner = SequencePlanner::new(SequencerType::Interval);
        planner.add_op("a", 0).add_op("b", 2).add_op("c", 0);

        let sequence = planner.resolve().unwrap();

        assert_eq!(sequence.elements(), ["b"]);
        assert_eq!(sequence.len().get(), 2);
    }

    #[test]
    fn empty_plan_is_rejected() {
        let planner = SequencePlanner::<&str>::new(SequencerType::Concat);
        assert!(planner.is_empty());

        assert!(matches!(planner.resolve(), Err(Error::NoElements)));
    }

    #[test]
    fn all_zero_plan_is_rejected() {
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        planner.add_op("a", 0).add_op("b", 0);

        assert!(matches!(planner.resolve(), Err(Error::NoElements)));
    }

    #[test]
    fn overflowing_plan_is_rejected() {
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        planner.add_op("a", u64::MAX).add_op("b", u64::MAX);

        assert!(matches!(planner.check(), Err(Error::RatioOverflow)));
        assert!(matches!(planner.resolve(), Err(Error::RatioOverflow)));
    }

    #[test]
    fn check_leaves_plan_intact() {
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        assert!(matches!(planner.check(), Err(Error::NoElements)));

        planner.add_op("O", 4).add_op("I", 3);
        planner.check().unwrap();
        assert_eq!(planner.len(), 2);
    }

    #[test]
    fn sequencer_can_be_replaced() {
        let mut planner = SequencePlanner::new(SequencerType::Bucket);
        planner
            .add_op("a", 2)
            .add_op("b", 1)
            .set_sequencer(SequencerType::Concat);

        assert_eq!(planner.sequencer(), SequencerType::Concat);

        let sequence = planner.resolve().unwrap();
        assert_eq!(sequence.sequence(), [0, 0, 1]);
    }
}
