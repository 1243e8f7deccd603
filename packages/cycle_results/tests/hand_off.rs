//! Integration tests for `cycle_results`.
//!
//! These follow the life of results the way a worker produces them: start a cycle, complete it,
//! move it into a buffer, freeze the buffer and hand the segment to a consumer on another thread.

use std::num::NonZero;
use std::thread;
use std::time::Duration;

use cycle_results::{CycleSegmentBuffer, Error, MutableCycleResult, SUCCESS};

#[test]
fn frozen_segments_cross_threads() {
    let mut buffer = CycleSegmentBuffer::new(NonZero::new(4).unwrap());

    for cycle in 0..4 {
        let pending = MutableCycleResult::start(cycle, Duration::from_micros(cycle));
        let code = if cycle % 2 == 0 { SUCCESS } else { 13 };
        buffer.append(pending.complete(code)).unwrap();
    }

    let segment = buffer.freeze();

    let summary = thread::spawn(move || segment.count_by_result())
        .join()
        .unwrap();

    assert_eq!(summary[&SUCCESS], 2);
    assert_eq!(summary[&13], 2);
}

#[test]
fn partially_filled_buffer_can_be_frozen_after_close() {
    let mut buffer = CycleSegmentBuffer::new(NonZero::new(10).unwrap());

    for cycle in 50..53 {
        buffer
            .append(MutableCycleResult::start(cycle, Duration::ZERO).complete(SUCCESS))
            .unwrap();
    }

    buffer.close();

    let rejected = buffer.append(MutableCycleResult::start(53, Duration::ZERO).complete(SUCCESS));
    assert!(matches!(rejected, Err(Error::BufferClosed)));

    let segment = buffer.freeze();

    assert_eq!(segment.len(), 3);
    assert_eq!(segment.first_cycle(), Some(50));
    assert_eq!(segment.last_cycle(), Some(52));
    assert!(segment.failures().is_empty());
}

#[test]
fn op_time_accounts_for_scheduling_delay() {
    let pending = MutableCycleResult::start(1, Duration::from_millis(5));
    let result = pending.complete(SUCCESS);

    assert!(result.op_time() >= Duration::from_millis(5));
    assert!(result.op_nanos() >= result.service_nanos());
    assert_eq!(
        result.op_nanos() - result.service_nanos(),
        5_000_000,
        "the difference is exactly the scheduling delay"
    );
}
