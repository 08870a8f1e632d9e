use serde::{Deserialize, Serialize};

/// Per-message timing and identity attached to every stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// When the underlying real-world event happened (producer supplied).
    pub originating_time: u64,
    /// When the message was written to the store.
    pub time: u64,
    /// Identifier of the producing stream.
    pub source_id: u32,
    /// Per-stream sequence number, starting at 0.
    pub sequence_id: u64,
}

impl Envelope {
    pub fn new(originating_time: u64, time: u64, source_id: u32, sequence_id: u64) -> Self {
        Self {
            originating_time,
            time,
            source_id,
            sequence_id,
        }
    }

    /// Write latency (`time - originating_time`), zero if the producer
    /// stamped an originating time in the future.
    pub fn latency_ns(&self) -> u64 {
        self.time.saturating_sub(self.originating_time)
    }
}
