pub mod exporter;

pub use exporter::JitterMetricsExporter;

/// Snapshot of a jitter buffer's counters. Every counter is cumulative over
/// the buffer's lifetime and never decreases; `current_depth` and
/// `peak_depth` are levels, in elements.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Metrics {
    /// Elements written into the buffer.
    pub enqueued: u64,
    /// Packets that wrote at least one element.
    pub filled_packets: u64,
    /// Elements that arrived behind the read cursor.
    pub dropped_stale: u64,
    /// Elements that did not fit in the window.
    pub dropped_overflow: u64,
    /// Elements whose position already held real data.
    pub dropped_duplicate: u64,
    /// Elements synthesized by the concealment handler.
    pub concealed: u64,
    /// Concealed elements replaced by real data before playout.
    pub updated: u64,
    /// Late elements whose position had already been played out as concealment.
    pub update_missed: u64,
    /// Positions jumped over when the window was advanced for an early packet.
    pub skipped: u64,
    /// Elements handed to the consumer.
    pub dequeued: u64,
    /// Elements requested before the buffer had a read position.
    pub underruns: u64,
    pub current_depth: usize,
    pub peak_depth: usize,
}

impl Metrics {
    pub fn dropped(&self) -> u64 {
        self.dropped_stale + self.dropped_overflow + self.dropped_duplicate
    }
}
