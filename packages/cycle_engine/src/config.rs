use std::num::NonZero;

use many_cpus::ProcessorSet;
use new_zealand::nz;
use op_sequence::SequencerType;
use toml::{Table, Value};

use crate::{CycleRange, Error, Result};

const DEFAULT_ALIAS: &str = "activity";
const DEFAULT_MAX_TRIES: NonZero<u32> = nz!(10);

/// Parameters of one activity.
///
/// Every field has a default, so an activity can be configured by naming only what differs:
///
/// ```
/// use cycle_engine::{ActivityConfig, CycleRange};
/// use new_zealand::nz;
///
/// let config = ActivityConfig::builder()
///     .alias("writes")
///     .cycles("1M".parse()?)
///     .threads(nz!(8))
///     .build();
///
/// assert_eq!(config.cycles().len().get(), 1_000_000);
/// # Ok::<(), cycle_engine::Error>(())
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ActivityConfig {
    alias: String,
    cycles: CycleRange,
    recycles: CycleRange,
    threads: NonZero<usize>,
    stride: NonZero<u64>,
    max_tries: NonZero<u32>,
    sequencer: SequencerType,
}

impl ActivityConfig {
    /// Starts building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> ActivityConfigBuilder {
        ActivityConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parses a configuration from a TOML document.
    ///
    /// Recognized keys are `alias`, `cycles`, `recycles`, `threads`, `stride`, `maxtries` and
    /// `seq`. Ranges and thread counts may be given as integers or as strings in the forms
    /// accepted by [`CycleRange`] and [`parse_thread_count()`].
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, contains an unknown key, has a value
    /// that cannot be used for its key or describes more cycles than fit in a `u64`.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let table = toml::from_str::<Table>(text)?;
        let mut builder = Self::builder();

        for (key, value) in &table {
            builder = match key.as_str() {
                "alias" => builder.alias(string_value(key, value)?),
                "cycles" => builder.cycles(range_value(key, value)?),
                "recycles" => builder.recycles(range_value(key, value)?),
                "threads" => builder.threads(match value {
                    Value::String(text) => parse_thread_count(text)?,
                    _ => narrowed_value(key, value)?,
                }),
                "stride" => builder.stride(positive_value(key, value)?),
                "maxtries" => builder.max_tries(narrowed_value(key, value)?),
                "seq" => builder.sequencer(string_value(key, value)?.parse()?),
                _ => {
                    return Err(Error::InvalidConfig {
                        key: key.clone(),
                        problem: "unknown key".to_string(),
                    });
                }
            };
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Checks constraints that span several fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleCountOverflow`] if the cycles across all recycles do not fit in a
    /// `u64`.
    pub fn validate(&self) -> Result<()> {
        self.total_cycles().map(|_| ())
    }

    /// The number of cycles the activity executes across all recycles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleCountOverflow`] if the count does not fit in a `u64`.
    pub fn total_cycles(&self) -> Result<u64> {
        self.cycles
            .len()
            .get()
            .checked_mul(self.recycles.len().get())
            .ok_or(Error::CycleCountOverflow)
    }

    /// Names the activity in logs and motor thread names.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The cycles executed in each recycle.
    #[must_use]
    pub fn cycles(&self) -> CycleRange {
        self.cycles
    }

    /// The recycle numbers to iterate over.
    #[must_use]
    pub fn recycles(&self) -> CycleRange {
        self.recycles
    }

    /// The number of motors to run.
    #[must_use]
    pub fn threads(&self) -> NonZero<usize> {
        self.threads
    }

    /// The number of cycles a motor claims at once.
    #[must_use]
    pub fn stride(&self) -> NonZero<u64> {
        self.stride
    }

    /// The maximum number of attempts per cycle for retryable operation failures.
    #[must_use]
    pub fn max_tries(&self) -> NonZero<u32> {
        self.max_tries
    }

    /// The algorithm used to interleave the operation mix.
    #[must_use]
    pub fn sequencer(&self) -> SequencerType {
        self.sequencer
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            alias: DEFAULT_ALIAS.to_string(),
            cycles: CycleRange::default(),
            recycles: CycleRange::default(),
            threads: nz!(1),
            stride: nz!(1),
            max_tries: DEFAULT_MAX_TRIES,
            sequencer: SequencerType::default(),
        }
    }
}

/// Builds an [`ActivityConfig`]. Created by [`ActivityConfig::builder()`].
#[derive(Debug)]
#[must_use]
pub struct ActivityConfigBuilder {
    config: ActivityConfig,
}

impl ActivityConfigBuilder {
    /// Sets the activity alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.config.alias = alias.into();
        self
    }

    /// Sets the cycles executed in each recycle.
    pub fn cycles(mut self, cycles: CycleRange) -> Self {
        self.config.cycles = cycles;
        self
    }

    /// Sets the recycles to iterate over.
    pub fn recycles(mut self, recycles: CycleRange) -> Self {
        self.config.recycles = recycles;
        self
    }

    /// Sets the number of motors.
    pub fn threads(mut self, threads: NonZero<usize>) -> Self {
        self.config.threads = threads;
        self
    }

    /// Sets how many cycles a motor claims at once.
    pub fn stride(mut self, stride: NonZero<u64>) -> Self {
        self.config.stride = stride;
        self
    }

    /// Sets the retry budget for retryable operation failures.
    pub fn max_tries(mut self, max_tries: NonZero<u32>) -> Self {
        self.config.max_tries = max_tries;
        self
    }

    /// Sets the sequencing algorithm for the operation mix.
    pub fn sequencer(mut self, sequencer: SequencerType) -> Self {
        self.config.sequencer = sequencer;
        self
    }

    /// Finishes building.
    ///
    /// Cross-field constraints are checked later by [`ActivityConfig::validate()`], which the
    /// executor calls before starting any motor.
    pub fn build(self) -> ActivityConfig {
        self.config
    }
}

/// Parses a thread count.
///
/// Accepts a positive integer, `auto` for one thread per processor or `Nx` for `N` threads per
/// processor.
///
/// # Errors
///
/// Returns [`Error::InvalidThreadCount`] if the text is in none of these forms or resolves to
/// zero threads.
pub fn parse_thread_count(text: &str) -> Result<NonZero<usize>> {
    let trimmed = text.trim();
    let invalid = || Error::InvalidThreadCount {
        value: text.to_string(),
    };

    let count = if trimmed.eq_ignore_ascii_case("auto") {
        processor_count()
    } else if let Some(multiplier) = trimmed
        .strip_suffix('x')
        .or_else(|| trimmed.strip_suffix('X'))
    {
        let multiplier: usize = multiplier.parse().map_err(|_| invalid())?;
        multiplier
            .checked_mul(processor_count())
            .ok_or_else(invalid)?
    } else {
        trimmed.parse().map_err(|_| invalid())?
    };

    NonZero::new(count).ok_or_else(invalid)
}

/// Processors available to the current process, respecting affinity and quota limits.
fn processor_count() -> usize {
    ProcessorSet::builder().take_all().map_or(1, |processors| processors.len())
}

fn string_value<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| Error::InvalidConfig {
        key: key.to_string(),
        problem: format!("expected a string, found {}", value.type_str()),
    })
}

fn range_value(key: &str, value: &Value) -> Result<CycleRange> {
    match value {
        Value::String(text) => text.parse(),
        _ => positive_value(key, value).map(CycleRange::with_count),
    }
}

fn positive_value(key: &str, value: &Value) -> Result<NonZero<u64>> {
    let integer = value.as_integer().ok_or_else(|| Error::InvalidConfig {
        key: key.to_string(),
        problem: format!("expected an integer, found {}", value.type_str()),
    })?;

    u64::try_from(integer)
        .ok()
        .and_then(NonZero::new)
        .ok_or_else(|| Error::InvalidConfig {
            key: key.to_string(),
            problem: format!("{integer} is not a positive count"),
        })
}

fn narrowed_value<T>(key: &str, value: &Value) -> Result<T>
where
    T: TryFrom<NonZero<u64>>,
{
    let count = positive_value(key, value)?;

    T::try_from(count).map_err(|_| Error::InvalidConfig {
        key: key.to_string(),
        problem: format!("{count} is too large"),
    })
}
