//! Registry error types
//!
//! Error types for mountpoint operations.

/// Error type for mountpoint operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountError {
    /// Mountpoint already has a producer
    #[error("mountpoint already has a source: {0}")]
    ProducerConflict(String),
    /// Caller is not the attached producer
    #[error("caller is not the attached source of {0}")]
    ProducerMismatch(String),
    /// Mountpoint was removed from the table
    #[error("mountpoint retired: {0}")]
    Retired(String),
}
