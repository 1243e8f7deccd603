//! Integration tests for `op_sequence`.
//!
//! These exercise the public API the way a workload runner uses it: plan weighted operations,
//! resolve them into a sequence, derive per-cycle dispensers with `transform()` and swap the
//! operation mix while readers are active.

use std::collections::HashMap;

use op_sequence::{OpSequence, SequencePlanner, SequencerType, SharedOpSequence};

#[derive(Debug, PartialEq)]
struct Template {
    name: &'static str,
}

#[derive(Debug)]
struct Dispenser {
    prefix: String,
}

impl Dispenser {
    fn apply(&self, cycle: u64) -> String {
        format!("{}-{cycle}", self.prefix)
    }
}

fn plan(sequencer: SequencerType, ops: &[(&'static str, u64)]) -> OpSequence<Template> {
    let mut planner = SequencePlanner::new(sequencer);

    for &(name, ratio) in ops {
        planner.add_op(Template { name }, ratio);
    }

    planner.resolve().unwrap()
}

#[test]
fn every_sequencer_produces_the_configured_mix_per_period() {
    let ops = [("read", 6), ("write", 3), ("delete", 1)];

    for sequencer in [
        SequencerType::Bucket,
        SequencerType::Interval,
        SequencerType::Concat,
    ] {
        let sequence = plan(sequencer, &ops);
        assert_eq!(sequence.len().get(), 10);

        let mut counts = HashMap::new();
        for cycle in 1_000..1_100 {
            *counts.entry(sequence.get(cycle).name).or_insert(0) += 1;
        }

        assert_eq!(counts["read"], 60, "{sequencer}");
        assert_eq!(counts["write"], 30, "{sequencer}");
        assert_eq!(counts["delete"], 10, "{sequencer}");
    }
}

#[test]
fn interval_avoids_clustering() {
    let sequence = plan(SequencerType::Interval, &[("a", 5), ("b", 5), ("c", 1)]);

    let names: Vec<_> = (0..11).map(|cycle| sequence.get(cycle).name).collect();

    assert_eq!(
        names,
        ["a", "b", "c", "a", "b", "a", "b", "a", "b", "a", "b"]
    );

    for window in names.windows(2) {
        assert!(
            window[0] != window[1] || window[0] == "c",
            "unexpected cluster in {names:?}"
        );
    }
}

#[test]
fn transformed_dispensers_follow_template_order() {
    let templates = plan(SequencerType::Bucket, &[("O", 4), ("I", 5)]);

    let dispensers = templates.transform(|template| Dispenser {
        prefix: template.name.to_lowercase(),
    });

    let ops: Vec<_> = (0..9)
        .map(|cycle| dispensers.get(cycle).apply(cycle))
        .collect();

    assert_eq!(
        ops,
        ["o-0", "i-1", "i-2", "o-3", "i-4", "o-5", "i-6", "o-7", "i-8"]
    );
}

#[test]
fn swapping_changes_resolution_for_all_handles() {
    let shared = SharedOpSequence::new(plan(SequencerType::Concat, &[("read", 1)]));
    let worker_view = shared.clone();

    assert_eq!(worker_view.load().get(42).name, "read");

    let previous = shared.swap(plan(SequencerType::Concat, &[("read", 1), ("write", 1)]));

    assert_eq!(previous.get(42).name, "read");
    assert_eq!(worker_view.load().get(42).name, "read");
    assert_eq!(worker_view.load().get(43).name, "write");
}

#[test]
fn sequencer_names_parse_from_configuration() {
    let sequencer: SequencerType = "interval".parse().unwrap();
    let sequence = plan(sequencer, &[("x", 2), ("y", 2)]);

    assert_eq!(sequence.sequence(), [0, 1, 0, 1]);
}
