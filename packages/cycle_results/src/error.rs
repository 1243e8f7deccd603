use thiserror::Error;

/// Errors that can occur when buffering cycle results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The buffer already holds as many results as its capacity allows.
    #[error("cycle result buffer is full (capacity {capacity})")]
    BufferFull {
        /// Capacity of the buffer that rejected the result.
        capacity: usize,
    },

    /// The buffer was closed and no longer accepts results.
    #[error("cycle result buffer is closed")]
    BufferClosed,
}

/// A specialized `Result` type for result buffering operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
