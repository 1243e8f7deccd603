use crossbeam::channel::{self, Receiver, Sender};
use cycle_results::CycleResultsSegment;

/// Receives the results of each drained cycle segment.
///
/// Motors call [`on_results()`][Self::on_results] from their own threads, so implementations must
/// not block for long: a slow sink slows the motor that calls it.
///
/// Closures of the form `Fn(CycleResultsSegment)` implement this trait.
pub trait ResultSink: Send + Sync {
    /// Takes ownership of a frozen segment of results.
    fn on_results(&self, segment: CycleResultsSegment);
}

impl<F> ResultSink for F
where
    F: Fn(CycleResultsSegment) + Send + Sync,
{
    fn on_results(&self, segment: CycleResultsSegment) {
        self(segment);
    }
}

/// A result sink that queues segments for a consumer to pull at its own pace.
///
/// The queue is unbounded, so motors never block on a slow consumer.
#[derive(Debug)]
pub struct ChannelResultSink {
    tx: Sender<CycleResultsSegment>,
    rx: Receiver<CycleResultsSegment>,
}

impl ChannelResultSink {
    /// Creates a sink with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// A receiver for the queued segments. All receivers share the same queue.
    #[must_use]
    pub fn receiver(&self) -> Receiver<CycleResultsSegment> {
        self.rx.clone()
    }

    /// Removes and returns all segments queued so far.
    #[must_use]
    pub fn drain(&self) -> Vec<CycleResultsSegment> {
        self.rx.try_iter().collect()
    }
}

impl Default for ChannelResultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink for ChannelResultSink {
    fn on_results(&self, segment: CycleResultsSegment) {
        // We hold a receiver ourselves, so the channel cannot be disconnected.
        drop(self.tx.send(segment));
    }
}
