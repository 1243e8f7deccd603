//! Metrics for activity motors.
//!
//! Each motor thread records into its own event instances, so recording never contends across
//! motors. Collect them with `nm::Report::collect()`.

use nm::{Event, Magnitude};

/// Histogram buckets for cycle service time in microseconds.
///
/// Service time excludes scheduling delay. Operations range from in-memory work to network
/// round trips, so the buckets span several orders of magnitude.
const SERVICE_TIME_US_BUCKETS: &[Magnitude] = &[
    0, 10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000, 1_000_000,
];

/// Histogram buckets for segment lengths in cycles.
const SEGMENT_LENGTH_BUCKETS: &[Magnitude] = &[1, 2, 4, 8, 16, 64, 256, 1024, 4096];

thread_local! {
    /// Cycles executed, whatever their result code.
    pub(crate) static CYCLES_EXECUTED: Event = Event::builder()
        .name("cycle_engine_cycles_executed")
        .build();

    /// Cycles that completed with a nonzero result code.
    pub(crate) static CYCLES_FAILED: Event = Event::builder()
        .name("cycle_engine_cycles_failed")
        .build();

    /// Time spent executing each cycle.
    ///
    /// The magnitude is the service time in microseconds.
    pub(crate) static CYCLE_SERVICE_TIME_US: Event = Event::builder()
        .name("cycle_engine_cycle_service_time_us")
        .histogram(SERVICE_TIME_US_BUCKETS)
        .build();

    /// Segments claimed from the input.
    ///
    /// The magnitude is the number of cycles in the segment.
    pub(crate) static SEGMENTS_CLAIMED: Event = Event::builder()
        .name("cycle_engine_segments_claimed")
        .histogram(SEGMENT_LENGTH_BUCKETS)
        .build();
}
