use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::iter;
use std::str::FromStr;

use itertools::Itertools;

use crate::{Error, Result};

/// Selects the algorithm used to turn a list of per-element ratios into a sequence of indexes.
///
/// All algorithms are deterministic: the same ratios always produce the same sequence. All of
/// them emit element `i` exactly `ratios[i]` times.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[expect(
    clippy::exhaustive_enums,
    reason = "the set of sequencers is part of the workload definition format and changes to it are breaking"
)]
pub enum SequencerType {
    /// Round-robin passes over the elements.
    ///
    /// The first pass visits every element with a nonzero ratio in declaration order. Each later
    /// pass visits the elements that still have occurrences left, those with the most remaining
    /// occurrences first (ties broken by declaration order). This interleaves elements as much
    /// as possible while keeping the heavier elements evenly spread toward the end.
    ///
    /// Ratios `A:4, B:3` produce `A B A B A B A`.
    #[default]
    Bucket,

    /// Places each element at its ideal evenly spaced positions.
    ///
    /// Occurrence `k` (0-based) of an element with ratio `r` has the ideal position `k / r` on
    /// the unit interval `[0, 1)`. All occurrences of all elements are ordered by that position,
    /// ties broken by declaration order. Positions are compared as exact fractions.
    ///
    /// Ratios `A:4, B:5` produce `A B B A B A B A B`.
    Interval,

    /// Emits all occurrences of each element in declaration order.
    ///
    /// Ratios `A:2, B:1` produce `A A B`.
    Concat,
}

impl SequencerType {
    /// The name of the sequencer as used in workload configuration.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Interval => "interval",
            Self::Concat => "concat",
        }
    }

    /// Produces the sequence of element indexes for `elements` weighted by `ratios`.
    ///
    /// The returned vector has length equal to the sum of the ratios and contains each index `i`
    /// exactly `ratios[i]` times. Elements with a ratio of zero never appear.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RatioCountMismatch`] if `elements` and `ratios` differ in length,
    /// [`Error::ZeroRatioSum`] if there are elements but every ratio is zero and
    /// [`Error::RatioOverflow`] if the sequence would not fit in memory.
    ///
    /// An empty element list yields an empty sequence.
    pub fn seq_indexes_by_ratios<T>(self, elements: &[T], ratios: &[u64]) -> Result<Vec<usize>> {
        if elements.len() != ratios.len() {
            return Err(Error::RatioCountMismatch {
                elements: elements.len(),
                ratios: ratios.len(),
            });
        }

        if ratios.is_empty() {
            return Ok(Vec::new());
        }

        let total = ratios
            .iter()
            .try_fold(0_u64, |sum, &ratio| sum.checked_add(ratio))
            .and_then(|sum| usize::try_from(sum).ok())
            .ok_or(Error::RatioOverflow)?;

        if total == 0 {
            return Err(Error::ZeroRatioSum {
                elements: elements.len(),
            });
        }

        // Every ratio is at most `total`, which we just proved fits in a usize.
        let ratios = ratios
            .iter()
            .map(|&ratio| {
                usize::try_from(ratio).expect("each ratio is bounded by the total, which fits")
            })
            .collect_vec();

        Ok(match self {
            Self::Bucket => bucket(&ratios, total),
            Self::Interval => interval(&ratios),
            Self::Concat => concat(&ratios, total),
        })
    }
}

impl fmt::Display for SequencerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SequencerType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        [Self::Bucket, Self::Interval, Self::Concat]
            .into_iter()
            .find(|candidate| candidate.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| Error::UnknownSequencer {
                value: s.to_string(),
            })
    }
}

fn concat(ratios: &[usize], total: usize) -> Vec<usize> {
    let mut sequence = Vec::with_capacity(total);

    for (index, &ratio) in ratios.iter().enumerate() {
        sequence.extend(iter::repeat_n(index, ratio));
    }

    sequence
}

fn bucket(ratios: &[usize], total: usize) -> Vec<usize> {
    let mut remaining = ratios.to_vec();
    let mut order = (0..ratios.len()).collect_vec();
    let mut sequence = Vec::with_capacity(total);

    while sequence.len() < total {
        for &index in &order {
            let left = remaining
                .get_mut(index)
                .expect("order only contains valid element indexes");

            if *left > 0 {
                sequence.push(index);
                *left = left.saturating_sub(1);
            }
        }

        // Stable sort keeps declaration order among elements with equal remaining counts.
        order.sort_by_key(|&index| Reverse(remaining.get(index).copied().unwrap_or_default()));
    }

    sequence
}

/// One occurrence of an element, positioned at `occurrence / ratio` in `[0, 1)`.
#[derive(Clone, Copy, Debug)]
struct Slot {
    occurrence: usize,
    ratio: usize,
    index: usize,
}

impl Slot {
    fn cmp_position(&self, other: &Self) -> Ordering {
        // a/b < c/d <=> a*d < c*b for positive denominators. Widened so it cannot overflow.
        let left = (self.occurrence as u128).wrapping_mul(other.ratio as u128);
        let right = (other.occurrence as u128).wrapping_mul(self.ratio as u128);

        left.cmp(&right).then(self.index.cmp(&other.index))
    }
}

fn interval(ratios: &[usize]) -> Vec<usize> {
    ratios
        .iter()
        .enumerate()
        .filter(|(_, ratio)| **ratio > 0)
        .flat_map(|(index, &ratio)| {
            (0..ratio).map(move |occurrence| Slot {
                occurrence,
                ratio,
                index,
            })
        })
        .sorted_by(Slot::cmp_position)
        .map(|slot| slot.index)
        .collect()
}
