//! Session management
//!
//! A connection becomes exactly one of:
//! - a source, relaying its stream into a mountpoint ([`SourceSession`])
//! - a subscriber, draining a bounded queue to the network ([`SubscriberSession`])
//! - a sourcetable request, answered and closed

pub mod source;
pub mod state;
pub mod subscriber;

pub use source::SourceSession;
pub use state::{CloseReason, SessionPhase, SessionRole, SessionState};
pub use subscriber::{QueueResult, SubscriberSession};
