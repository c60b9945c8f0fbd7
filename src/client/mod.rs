//! NTRIP client implementation
//!
//! Provides client-side NTRIP for:
//! - Pushing a correction stream to a caster ([`NtripSource`])
//! - Reading a mountpoint like a rover ([`NtripClient`])
//! - Fetching a caster's sourcetable ([`fetch_sourcetable`])

pub mod config;
pub mod connector;
pub mod source;
pub mod subscriber;

pub use config::ClientConfig;
pub use connector::NtripConnector;
pub use source::{NtripSource, SourceEvent};
pub use subscriber::{fetch_sourcetable, NtripClient};
