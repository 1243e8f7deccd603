use std::fmt;
use std::num::NonZero;
use std::ops::Range;
use std::str::FromStr;

use crate::{Error, Result};

/// A nonempty, half-open range of cycle numbers `start..end`.
///
/// # Text format
///
/// * `N` is the range `0..N`.
/// * `A..B` is the range `A..B`.
///
/// Each number may carry a unit suffix: `K` (thousand), `M` (million), `B` or `G` (billion),
/// case-insensitive. Underscores between digits are ignored.
///
/// ```
/// use cycle_engine::CycleRange;
///
/// let range: CycleRange = "10M".parse().unwrap();
/// assert_eq!(range.start(), 0);
/// assert_eq!(range.end(), 10_000_000);
///
/// let range: CycleRange = "1K..2_500".parse().unwrap();
/// assert_eq!(range.len().get(), 1_500);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CycleRange {
    start: u64,
    end: u64,
}

impl CycleRange {
    /// Creates the range `start..end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCycleRange`] if `end` is not greater than `start`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end <= start {
            return Err(Error::EmptyCycleRange { start, end });
        }

        Ok(Self { start, end })
    }

    /// The range `0..count`.
    #[must_use]
    pub fn with_count(count: NonZero<u64>) -> Self {
        Self {
            start: 0,
            end: count.get(),
        }
    }

    /// The first cycle in the range.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// One past the last cycle in the range.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// The number of cycles in the range.
    #[must_use]
    pub fn len(&self) -> NonZero<u64> {
        NonZero::new(self.end.wrapping_sub(self.start))
            .expect("empty ranges are rejected at construction")
    }

    /// Whether `cycle` is inside the range.
    #[must_use]
    pub fn contains(&self, cycle: u64) -> bool {
        (self.start..self.end).contains(&cycle)
    }

    /// The range as a standard library range.
    #[must_use]
    pub fn as_range(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl Default for CycleRange {
    fn default() -> Self {
        Self { start: 0, end: 1 }
    }
}

impl TryFrom<Range<u64>> for CycleRange {
    type Error = Error;

    fn try_from(range: Range<u64>) -> Result<Self> {
        Self::new(range.start, range.end)
    }
}

impl fmt::Display for CycleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for CycleRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();

        let (start, end) = match trimmed.split_once("..") {
            Some((start, end)) => (parse_count(s, start)?, parse_count(s, end)?),
            None => (0, parse_count(s, trimmed)?),
        };

        Self::new(start, end)
    }
}

fn parse_count(original: &str, text: &str) -> Result<u64> {
    let invalid = |problem| Error::InvalidCycleRange {
        value: original.to_string(),
        problem,
    };

    let text = text.trim();

    let (digits, multiplier) = match text.chars().last() {
        Some('k' | 'K') => (text.get(..text.len().saturating_sub(1)), 1_000),
        Some('m' | 'M') => (text.get(..text.len().saturating_sub(1)), 1_000_000),
        Some('b' | 'B' | 'g' | 'G') => (text.get(..text.len().saturating_sub(1)), 1_000_000_000),
        _ => (Some(text), 1),
    };

    let digits = digits.unwrap_or_default().replace('_', "");

    if digits.is_empty() {
        return Err(invalid("missing number"));
    }

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected a whole number with an optional K, M, B or G suffix"));
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(|value| value.checked_mul(multiplier))
        .ok_or_else(|| invalid("number is too large"))
}
