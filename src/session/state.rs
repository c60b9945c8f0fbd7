//! Session state machine
//!
//! Tracks a caster session from TCP accept to close. Every connection walks
//! the same phases:
//!
//! ```text
//! Connecting ──► Authorizing ──► Active ──► Draining ──► Closed
//!      │              │             │                      ▲
//!      └──────────────┴─────────────┴──────────────────────┘
//! ```
//!
//! `Draining` only exists for subscribers: queued bytes are flushed for a
//! bounded time before the connection is released.

use std::net::SocketAddr;
use std::time::Instant;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// TCP connected, request header not yet read
    Connecting,
    /// Header parsed, credentials being checked
    Authorizing,
    /// Streaming
    Active,
    /// Flushing queued bytes before close
    Draining,
    /// Session closed
    Closed,
}

impl SessionPhase {
    /// Whether `next` is a legal successor of this phase
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;

        matches!(
            (self, next),
            (Connecting, Authorizing)
                | (Authorizing, Active)
                | (Active, Draining)
                | (Connecting | Authorizing | Active | Draining, Closed)
        )
    }

    /// Whether the session still accepts stream data
    pub fn is_active(self) -> bool {
        self == SessionPhase::Active
    }

    /// Whether the session has begun shutting down
    pub fn is_terminating(self) -> bool {
        matches!(self, SessionPhase::Draining | SessionPhase::Closed)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its side
    PeerClosed,
    /// Outbound queue overflowed under `DisconnectSlow`
    Overflow,
    /// Writing to the peer failed
    WriteFailure,
    /// No data for longer than the idle timeout
    IdleTimeout,
    /// Detached by the mountpoint (source dropped, retirement)
    Detached,
    /// Caster shutting down
    Shutdown,
}

/// What a connection turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// SOURCE / NTRIP 2.0 POST
    Source,
    /// GET on a mountpoint
    Subscriber,
    /// GET on the caster root
    Sourcetable,
    /// `/adm/api/v1/` call
    Admin,
}

/// Connection-level session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Role, once the request is classified
    pub role: Option<SessionRole>,

    /// Mountpoint, once the request is classified
    pub mount: Option<String>,

    /// Connection start time
    pub connected_at: Instant,

    /// Bytes read from the peer
    pub bytes_received: u64,

    /// Bytes written to the peer
    pub bytes_sent: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connecting,
            role: None,
            mount: None,
            connected_at: Instant::now(),
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Move to `next` if the transition is legal
    ///
    /// Returns false (and leaves the phase untouched) otherwise.
    pub fn advance(&mut self, next: SessionPhase) -> bool {
        if self.phase.can_advance_to(next) {
            self.phase = next;
            true
        } else {
            tracing::trace!(
                session_id = self.id,
                from = ?self.phase,
                to = ?next,
                "Ignoring invalid session transition"
            );
            false
        }
    }

    /// Record the classified request
    pub fn classify(&mut self, role: SessionRole, mount: Option<&str>) {
        self.role = Some(role);
        self.mount = mount.map(str::to_owned);
    }

    /// Get session duration
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    /// Mark the session closed
    pub fn close(&mut self) {
        self.advance(SessionPhase::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_session_lifecycle() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2101);
        let mut state = SessionState::new(1, addr);

        assert_eq!(state.phase, SessionPhase::Connecting);

        assert!(state.advance(SessionPhase::Authorizing));
        state.classify(SessionRole::Subscriber, Some("RTCM3"));
        assert!(state.advance(SessionPhase::Active));
        assert!(state.advance(SessionPhase::Draining));
        assert!(state.advance(SessionPhase::Closed));

        assert_eq!(state.role, Some(SessionRole::Subscriber));
        assert_eq!(state.mount.as_deref(), Some("RTCM3"));
    }

    #[test]
    fn test_invalid_transitions_refused() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 2101);
        let mut state = SessionState::new(1, addr);

        // Cannot skip authorization
        assert!(!state.advance(SessionPhase::Active));
        assert_eq!(state.phase, SessionPhase::Connecting);

        // Closed is terminal
        state.close();
        assert!(!state.advance(SessionPhase::Authorizing));
        assert!(!state.advance(SessionPhase::Closed));
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_phase_predicates() {
        assert!(SessionPhase::Active.is_active());
        assert!(!SessionPhase::Draining.is_active());
        assert!(SessionPhase::Draining.is_terminating());
        assert!(!SessionPhase::Authorizing.is_terminating());
    }
}
