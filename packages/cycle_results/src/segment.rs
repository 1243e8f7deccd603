use std::collections::BTreeMap;
use std::slice;
use std::sync::Arc;

use crate::{CycleResult, ResultCode};

/// An immutable batch of cycle results, in the order they were recorded.
///
/// Cloning is cheap; clones share the same underlying results.
#[derive(Clone, Debug, Default)]
pub struct CycleResultsSegment {
    results: Arc<[CycleResult]>,
}

impl CycleResultsSegment {
    /// The number of results in the segment.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the segment holds no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Iterates over the results in recorded order.
    pub fn iter(&self) -> slice::Iter<'_, CycleResult> {
        self.results.iter()
    }

    /// The result at `index` in recorded order, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CycleResult> {
        self.results.get(index)
    }

    /// The results as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[CycleResult] {
        &self.results
    }

    /// A new segment containing only the results that match `predicate`, in the same order.
    #[must_use]
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&CycleResult) -> bool,
    {
        self.iter().filter(|result| predicate(result)).copied().collect()
    }

    /// A new segment containing only the results with a nonzero result code.
    #[must_use]
    pub fn failures(&self) -> Self {
        self.filter(|result| !result.is_success())
    }

    /// The lowest cycle number in the segment.
    #[must_use]
    pub fn first_cycle(&self) -> Option<u64> {
        self.iter().map(CycleResult::cycle).min()
    }

    /// The highest cycle number in the segment.
    #[must_use]
    pub fn last_cycle(&self) -> Option<u64> {
        self.iter().map(CycleResult::cycle).max()
    }

    /// How many results carry each distinct result code.
    #[must_use]
    pub fn count_by_result(&self) -> BTreeMap<ResultCode, usize> {
        let mut counts = BTreeMap::new();

        for result in self.iter() {
            let count: &mut usize = counts.entry(result.result()).or_default();
            *count = count.saturating_add(1);
        }

        counts
    }
}

impl From<Vec<CycleResult>> for CycleResultsSegment {
    fn from(results: Vec<CycleResult>) -> Self {
        Self {
            results: results.into(),
        }
    }
}

impl FromIterator<CycleResult> for CycleResultsSegment {
    fn from_iter<I: IntoIterator<Item = CycleResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CycleResultsSegment {
    type Item = &'a CycleResult;
    type IntoIter = slice::Iter<'a, CycleResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
