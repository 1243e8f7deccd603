use thiserror::Error;

/// Errors that can occur when building an operation sequence.
///
/// All of these are configuration errors: they are detected while planning, before any cycle is
/// resolved.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The number of ratios did not match the number of elements they apply to.
    #[error("{ratios} ratios were provided for {elements} elements")]
    RatioCountMismatch {
        /// Number of elements to sequence.
        elements: usize,

        /// Number of ratios provided.
        ratios: usize,
    },

    /// There were elements to sequence but all of their ratios were zero, so no element could
    /// ever be selected.
    #[error("the ratios of all {elements} elements are zero")]
    ZeroRatioSum {
        /// Number of elements whose ratios summed to zero.
        elements: usize,
    },

    /// An operation sequence was requested for an empty list of elements.
    #[error("an operation sequence requires at least one element")]
    NoElements,

    /// The sum of the ratios does not fit in the address space.
    #[error("the sum of ratios is too large to materialize as a sequence")]
    RatioOverflow,

    /// An index array referred to an element that does not exist.
    #[error("sequence index {index} is out of bounds for {elements} elements")]
    IndexOutOfBounds {
        /// The offending index.
        index: usize,

        /// Number of elements available.
        elements: usize,
    },

    /// A sequencer name did not match any known sequencer.
    #[error("unknown sequencer '{value}', expected one of: bucket, interval, concat")]
    UnknownSequencer {
        /// The name that could not be matched.
        value: String,
    },
}

/// A specialized `Result` type for sequencing operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
