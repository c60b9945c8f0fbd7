//! Per-mountpoint configuration

use std::time::Duration;

/// What to do when a subscriber's outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued chunks, accepting a gap in the stream
    DropOldest,
    /// Terminate the subscriber session
    #[default]
    DisconnectSlow,
}

/// How a late-joining subscriber is primed from the ring buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimePolicy {
    /// Start from the next published byte
    #[default]
    Skip,
    /// Hand over the whole ring buffer first
    Flush,
    /// Hand over the ring buffer starting at the first complete RTCM 3 frame
    FlushFramed,
}

/// Bounds on a subscriber's outbound queue
///
/// The queue is full as soon as either bound would be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCapacity {
    /// Maximum queued chunks
    pub max_chunks: usize,
    /// Maximum queued bytes
    pub max_bytes: usize,
}

impl QueueCapacity {
    /// Bound by chunk count only
    pub fn chunks(max_chunks: usize) -> Self {
        Self {
            max_chunks,
            max_bytes: usize::MAX,
        }
    }

    /// Bound by byte count only
    pub fn bytes(max_bytes: usize) -> Self {
        Self {
            max_chunks: usize::MAX,
            max_bytes,
        }
    }
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self {
            max_chunks: 256,
            max_bytes: 256 * 1024,
        }
    }
}

/// Configuration applied to a mountpoint when it is created
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Ring buffer size in bytes (0 disables it)
    pub ring_capacity: usize,

    /// Subscriber outbound queue bounds
    pub queue_capacity: QueueCapacity,

    /// Subscriber overflow policy
    pub overflow_policy: OverflowPolicy,

    /// Late-joiner priming policy
    pub prime_policy: PrimePolicy,

    /// Disconnect subscribers after this long without data while no source is attached
    pub subscriber_idle_timeout: Duration,

    /// Force-detach a source that sends nothing for this long
    pub producer_idle_timeout: Duration,

    /// How long a draining subscriber may take to flush its queue
    pub drain_timeout: Duration,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            // A few seconds of a typical 1-5 KB/s RTCM stream
            ring_capacity: 16 * 1024,
            queue_capacity: QueueCapacity::default(),
            overflow_policy: OverflowPolicy::DisconnectSlow,
            prime_policy: PrimePolicy::Skip,
            subscriber_idle_timeout: Duration::from_secs(30),
            producer_idle_timeout: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

impl MountConfig {
    /// Set the ring buffer capacity in bytes
    pub fn ring_capacity(mut self, bytes: usize) -> Self {
        self.ring_capacity = bytes;
        self
    }

    /// Set the subscriber queue bounds
    pub fn queue_capacity(mut self, capacity: QueueCapacity) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the overflow policy
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Set the priming policy
    pub fn prime_policy(mut self, policy: PrimePolicy) -> Self {
        self.prime_policy = policy;
        self
    }

    /// Set the subscriber idle timeout
    pub fn subscriber_idle_timeout(mut self, timeout: Duration) -> Self {
        self.subscriber_idle_timeout = timeout;
        self
    }

    /// Set the producer idle timeout
    pub fn producer_idle_timeout(mut self, timeout: Duration) -> Self {
        self.producer_idle_timeout = timeout;
        self
    }

    /// Set the drain timeout
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MountConfig::default();

        assert_eq!(config.overflow_policy, OverflowPolicy::DisconnectSlow);
        assert_eq!(config.prime_policy, PrimePolicy::Skip);
        assert!(config.ring_capacity > 0);
        assert_eq!(config.queue_capacity, QueueCapacity::default());
    }

    #[test]
    fn test_builder_chaining() {
        let config = MountConfig::default()
            .ring_capacity(4096)
            .queue_capacity(QueueCapacity::chunks(2))
            .overflow_policy(OverflowPolicy::DropOldest)
            .prime_policy(PrimePolicy::FlushFramed)
            .subscriber_idle_timeout(Duration::from_secs(5))
            .drain_timeout(Duration::from_millis(100));

        assert_eq!(config.ring_capacity, 4096);
        assert_eq!(config.queue_capacity.max_chunks, 2);
        assert_eq!(config.queue_capacity.max_bytes, usize::MAX);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(config.prime_policy, PrimePolicy::FlushFramed);
        assert_eq!(config.subscriber_idle_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_millis(100));
    }
}
