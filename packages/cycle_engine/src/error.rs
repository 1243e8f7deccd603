use std::io;

use thiserror::Error;

/// Errors that can occur when configuring or running an activity.
///
/// Configuration problems are reported synchronously, before any motor starts. Fatal errors
/// raised while cycles are running are reported by the executor method that observes them,
/// typically [`ActivityExecutor::await_completion()`][crate::ActivityExecutor::await_completion].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A cycle range could not be parsed.
    #[error("invalid cycle range '{value}': {problem}")]
    InvalidCycleRange {
        /// The text that could not be parsed.
        value: String,

        /// What was wrong with it.
        problem: &'static str,
    },

    /// A cycle range does not contain any cycles.
    #[error("cycle range {start}..{end} is empty")]
    EmptyCycleRange {
        /// Inclusive start of the range.
        start: u64,

        /// Exclusive end of the range.
        end: u64,
    },

    /// The total number of cycles across all recycles does not fit in a `u64`.
    #[error("the total number of cycles across all recycles is too large")]
    CycleCountOverflow,

    /// A thread count could not be parsed or resolved to a nonzero count.
    #[error("invalid thread count '{value}'")]
    InvalidThreadCount {
        /// The text that could not be parsed.
        value: String,
    },

    /// A configuration entry is unknown or has an unusable value.
    #[error("invalid configuration for '{key}': {problem}")]
    InvalidConfig {
        /// The configuration key.
        key: String,

        /// What was wrong with it.
        problem: String,
    },

    /// The operation mix could not be sequenced.
    #[error(transparent)]
    Sequence(#[from] op_sequence::Error),

    /// A configuration document is not valid TOML.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// The action source refused to prepare for the activity.
    #[error("failed to prepare actions: {message}")]
    ActionSetup {
        /// The reason reported by the action source.
        message: String,
    },

    /// A motor stopped because of a fatal error.
    #[error("motor {slot} failed: {message}")]
    MotorErrored {
        /// The slot of the first motor that failed.
        slot: usize,

        /// The fatal error reported by that motor.
        message: String,
    },

    /// The operating system refused to start a motor thread.
    #[error("failed to spawn motor thread")]
    MotorSpawn {
        /// The error reported when spawning the thread.
        #[source]
        source: io::Error,
    },
}

/// A specialized `Result` type for activity operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
