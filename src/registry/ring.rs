//! Ring buffer of recent producer bytes
//!
//! Keeps the newest `capacity` bytes a producer published so a late-joining
//! subscriber can optionally be primed with them. Eviction is byte exact: the
//! oldest chunk is trimmed in place rather than dropped whole, so the buffer
//! always holds a contiguous tail of the stream.

use std::collections::VecDeque;

use bytes::BytesMut;

use super::chunk::Chunk;

/// Byte-capped ring of recent chunks
#[derive(Debug)]
pub struct RingBuffer {
    /// Maximum buffered bytes
    capacity: usize,
    /// Currently buffered bytes
    size: usize,
    /// Buffered chunks, oldest first
    chunks: VecDeque<Chunk>,
}

impl RingBuffer {
    /// Create a ring holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            size: 0,
            chunks: VecDeque::new(),
        }
    }

    /// Append a chunk, evicting the oldest bytes beyond capacity
    pub fn push(&mut self, mut chunk: Chunk) {
        if self.capacity == 0 || chunk.is_empty() {
            return;
        }

        // A single chunk larger than the ring keeps only its tail
        if chunk.len() > self.capacity {
            chunk.advance(chunk.len() - self.capacity);
            self.chunks.clear();
            self.size = 0;
        }

        self.size += chunk.len();
        self.chunks.push_back(chunk);

        while self.size > self.capacity {
            let excess = self.size - self.capacity;
            let Some(front) = self.chunks.front_mut() else {
                break;
            };

            if front.len() <= excess {
                self.size -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(excess);
                self.size -= excess;
            }
        }
    }

    /// Buffered chunks, oldest first
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Buffered bytes as one contiguous chunk
    ///
    /// Returns `None` when the ring is empty.
    pub fn contiguous(&self) -> Option<Chunk> {
        let first = self.chunks.front()?;
        if self.chunks.len() == 1 {
            return Some(first.clone());
        }

        let mut buf = BytesMut::with_capacity(self.size);
        for chunk in &self.chunks {
            buf.extend_from_slice(&chunk.data);
        }
        Some(Chunk::new(first.seq, buf.freeze()))
    }

    /// Stream offset of the oldest buffered byte
    pub fn start_seq(&self) -> Option<u64> {
        self.chunks.front().map(|c| c.seq)
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.size = 0;
    }

    /// Number of buffered bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of buffered chunks
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Configured capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::with_capacity(16 * 1024)
    }
}
