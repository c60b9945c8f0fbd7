//! Mountpoint registry and broadcast hubs
//!
//! The registry owns every active mountpoint and routes producer bytes to
//! subscribers.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<MountpointTable>
//!                  ┌──────────────────────────┐
//!                  │ mounts: HashMap<String,  │
//!                  │   Arc<MountState> {      │
//!                  │     producer slot,       │
//!                  │     ring buffer,         │
//!                  │     subscribers (Weak),  │
//!                  │   }                      │
//!                  │ >                        │
//!                  └────────────┬─────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//!     [Source]            [Subscriber]          [Subscriber]
//!   guard.publish()      session.deliver()     session.deliver()
//!         │                     ▲                     ▲
//!         └──► enqueue() ───────┴─────────────────────┘
//! ```
//!
//! # Zero-Copy Design
//!
//! Chunks carry `bytes::Bytes`, so the ring buffer and every subscriber queue
//! share one allocation per published read; fan-out only bumps reference
//! counts.

pub mod chunk;
pub mod config;
pub mod error;
pub mod mount;
pub mod ring;
pub mod store;

pub use chunk::{Chunk, GapDetector};
pub use config::{MountConfig, OverflowPolicy, PrimePolicy, QueueCapacity};
pub use error::MountError;
pub use mount::{AttachReport, MountState, ProducerGuard, PublishReport};
pub use ring::RingBuffer;
pub use store::MountpointTable;
