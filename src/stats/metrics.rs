//! Statistics for caster sessions and mountpoints

use std::time::Duration;

use crate::session::SessionPhase;

/// Connection-level statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Session ID
    pub session_id: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Connection duration
    pub duration: Duration,
    /// Bitrate estimate of received data (bits/sec)
    pub bitrate: u64,
}

impl SessionStats {
    /// Create new stats for a session
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_received * 8) / secs;
        }
    }
}

/// Snapshot of one subscriber's outbound queue
#[derive(Debug, Clone)]
pub struct SubscriberStats {
    /// Session ID
    pub session_id: u64,
    /// Mountpoint
    pub mount: String,
    /// Current phase
    pub phase: SessionPhase,
    /// Chunks waiting to be written
    pub queued_chunks: usize,
    /// Bytes waiting to be written
    pub queued_bytes: usize,
    /// Chunks ever accepted into the queue
    pub chunks_enqueued: u64,
    /// Bytes written to the peer
    pub bytes_sent: u64,
    /// Chunks discarded by the overflow policy
    pub chunks_dropped: u64,
    /// Bytes discarded by the overflow policy
    pub bytes_dropped: u64,
    /// Discontinuities observed in the delivered stream
    pub gaps: u64,
    /// Time since the session was created
    pub connected_for: Duration,
}

/// Snapshot of one mountpoint (a "livesource" entry)
#[derive(Debug, Clone)]
pub struct MountStats {
    /// Mountpoint name
    pub name: String,
    /// Session ID of the attached source, if any
    pub producer_session: Option<u64>,
    /// Live subscribers
    pub subscriber_count: usize,
    /// Total bytes published
    pub bytes_in: u64,
    /// Total chunks published
    pub chunks_in: u64,
    /// Offset of the next published byte
    pub next_seq: u64,
    /// Bytes held for late joiners
    pub ring_bytes: usize,
    /// Number of sources that have attached over the mount's lifetime
    pub sources_served: u64,
    /// Time since the last source detached, while none is attached
    pub idle_for: Option<Duration>,
    /// Time since the mount was created
    pub age: Duration,
}

impl MountStats {
    /// Whether a source is currently attached
    pub fn is_live(&self) -> bool {
        self.producer_session.is_some()
    }

    /// Average inbound bitrate over the mount's lifetime (bits/sec)
    pub fn bitrate(&self) -> u64 {
        let secs = self.age.as_secs();
        if secs > 0 {
            (self.bytes_in * 8) / secs
        } else {
            0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Current open connections
    pub active_connections: u64,
    /// Connections refused by the connection limit
    pub rejected_connections: u64,
    /// Total bytes received from sources
    pub total_bytes_received: u64,
    /// Total bytes sent to subscribers
    pub total_bytes_sent: u64,
    /// Mountpoints with a live source
    pub active_sources: u64,
    /// Mountpoints currently in the table
    pub active_mounts: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount_stats(bytes_in: u64, age: Duration) -> MountStats {
        MountStats {
            name: "RTCM3".into(),
            producer_session: None,
            subscriber_count: 0,
            bytes_in,
            chunks_in: 0,
            next_seq: bytes_in,
            ring_bytes: 0,
            sources_served: 0,
            idle_for: None,
            age,
        }
    }

    #[test]
    fn test_session_stats_new() {
        let stats = SessionStats::new(7);
        assert_eq!(stats.session_id, 7);
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_session_stats_calculate_bitrate() {
        let mut stats = SessionStats::new(1);
        stats.bytes_received = 1_000_000;
        stats.duration = Duration::from_secs(10);

        stats.calculate_bitrate();

        // 1,000,000 bytes * 8 bits / 10 seconds
        assert_eq!(stats.bitrate, 800_000);
    }

    #[test]
    fn test_session_stats_calculate_bitrate_zero_duration() {
        let mut stats = SessionStats::new(1);
        stats.bytes_received = 1_000_000;

        stats.calculate_bitrate();

        assert_eq!(stats.bitrate, 0);
    }

    #[test]
    fn test_mount_stats_bitrate() {
        assert_eq!(mount_stats(1_000, Duration::from_secs(2)).bitrate(), 4_000);
        assert_eq!(mount_stats(1_000, Duration::ZERO).bitrate(), 0);
    }

    #[test]
    fn test_mount_stats_is_live() {
        let mut stats = mount_stats(0, Duration::ZERO);
        assert!(!stats.is_live());

        stats.producer_session = Some(3);
        assert!(stats.is_live());
    }

    #[test]
    fn test_server_stats_new() {
        let stats = ServerStats::new();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.rejected_connections, 0);
        assert_eq!(stats.active_sources, 0);
    }
}
