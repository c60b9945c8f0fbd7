//! NTRIP caster
//!
//! Accepts one authenticated source per mountpoint and relays its byte
//! stream, as it arrives, to any number of authenticated subscribers on the
//! same mountpoint. Memory stays bounded however slow a subscriber is, and
//! sources and subscribers may come and go independently.
//!
//! ```no_run
//! use ntrip_caster::{AuthRegistry, CasterServer, MountpointDefinition, ServerConfig};
//!
//! # async fn run() -> ntrip_caster::Result<()> {
//! let auth = AuthRegistry::new(vec![
//!     MountpointDefinition::new("RTCM3", "sourcepass").subscriber("rover", "roverpass"),
//! ]);
//! let server = CasterServer::new(ServerConfig::default(), auth);
//! server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await
//! # }
//! ```
//!
//! The library emits `tracing` events and never installs a subscriber.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use auth::{AuthRegistry, Credential, MountpointDefinition};
pub use error::{Error, Result};
pub use protocol::NtripVersion;
pub use registry::{MountConfig, MountpointTable, OverflowPolicy, PrimePolicy, QueueCapacity};
pub use server::{CasterServer, ServerConfig};
pub use stats::{MountStats, ServerStats};
