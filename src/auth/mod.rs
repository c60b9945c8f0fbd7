//! Mountpoint authorization
//!
//! Sources and subscribers authenticate per mountpoint. Sources use either
//! the NTRIP 1.0 password-only `SOURCE` line or HTTP Basic; subscribers use
//! HTTP Basic. A mountpoint without subscriber credentials is public.

pub mod credential;
pub mod registry;

pub use credential::Credential;
pub use registry::{
    AuthOutcome, AuthRegistry, MountpointDefinition, SourceCredential, UserCredential,
};
