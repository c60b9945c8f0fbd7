//! Error types for the caster
//!
//! Every error here is scoped to a single connection. Nothing in the caster
//! is process-fatal: the connection that produced the error is answered (when
//! a response still makes sense) and closed, and every other connection and
//! mountpoint carries on.

use std::io;

use crate::registry::MountError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Connection-scoped caster error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request line or headers could not be understood
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Header was not terminated within the byte or time budget
    #[error("request header exceeded its size or time budget")]
    HeaderTimeout,

    /// Peer closed the connection before the header terminator
    #[error("connection closed before the request header was complete")]
    ConnectionClosed,

    /// Bad credential or unknown mountpoint
    #[error("authorization failed for mountpoint {0}")]
    AuthFailure(String),

    /// Mountpoint already has a live producer
    #[error("mountpoint {0} already has a source")]
    ProducerConflict(String),

    /// The producer slot was taken from this session (drop, idle timeout or retirement)
    #[error("source for mountpoint {0} was dropped")]
    SourceDropped(String),

    /// Subscriber queue overflowed under the disconnect policy
    #[error("subscriber queue overflow")]
    QueueOverflow,

    /// Writing to the peer failed or timed out
    #[error("write to peer failed: {0}")]
    WriteFailure(#[source] io::Error),

    /// The caster answered a client request with something unexpected
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Any other I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error came from the peer misbehaving (as opposed to I/O)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedRequest(_)
                | Error::HeaderTimeout
                | Error::AuthFailure(_)
                | Error::ProducerConflict(_)
        )
    }
}

impl From<MountError> for Error {
    fn from(err: MountError) -> Self {
        match err {
            MountError::ProducerConflict(name) => Error::ProducerConflict(name),
            MountError::ProducerMismatch(name) | MountError::Retired(name) => {
                Error::SourceDropped(name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_error_conversion() {
        let err: Error = MountError::ProducerConflict("RTCM3".into()).into();
        assert!(matches!(err, Error::ProducerConflict(ref m) if m == "RTCM3"));

        let err: Error = MountError::ProducerMismatch("RTCM3".into()).into();
        assert!(matches!(err, Error::SourceDropped(_)));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::HeaderTimeout.is_client_error());
        assert!(Error::AuthFailure("M".into()).is_client_error());
        assert!(!Error::QueueOverflow.is_client_error());
        assert!(!Error::Io(io::Error::other("boom")).is_client_error());
    }
}
