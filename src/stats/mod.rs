//! Statistics and metrics

pub mod metrics;

pub use metrics::{MountStats, ServerStats, SessionStats, SubscriberStats};
