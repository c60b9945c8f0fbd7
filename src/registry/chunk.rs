//! Sequenced byte chunks
//!
//! Everything a producer publishes is wrapped in a [`Chunk`] carrying the
//! stream offset of its first byte. Offsets are monotonic per mountpoint, so a
//! receiver can tell when bytes went missing between two chunks.

use bytes::Bytes;

/// A run of producer bytes tagged with its stream offset
///
/// Cheap to clone: the payload is reference counted and shared between the
/// ring buffer and every subscriber queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Stream offset of the first byte in `data`
    pub seq: u64,
    /// Payload
    pub data: Bytes,
}

impl Chunk {
    /// Create a chunk starting at `seq`
    pub fn new(seq: u64, data: Bytes) -> Self {
        Self { seq, data }
    }

    /// Number of payload bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the chunk carries no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Stream offset one past the last byte
    pub fn end_seq(&self) -> u64 {
        self.seq + self.data.len() as u64
    }

    /// Drop the first `n` bytes, advancing `seq` accordingly
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.data.len());
        self.data = self.data.slice(n..);
        self.seq += n as u64;
    }
}

/// Tracks the expected next offset on the receiving side
#[derive(Debug, Default, Clone, Copy)]
pub struct GapDetector {
    expected: Option<u64>,
}

impl GapDetector {
    /// Record `chunk` and return how many bytes were skipped before it
    pub fn observe(&mut self, chunk: &Chunk) -> u64 {
        let gap = match self.expected {
            Some(expected) if chunk.seq > expected => chunk.seq - expected,
            _ => 0,
        };
        self.expected = Some(chunk.end_seq());
        gap
    }
}
