//! NTRIP wire protocol
//!
//! This module provides:
//! - Request header framing and classification
//! - Response and sourcetable rendering
//! - RTCM 3 frame boundary detection

pub mod constants;
pub mod request;
pub mod response;
pub mod rtcm;
pub mod sourcetable;

pub use request::{
    read_request, AdminMethod, AdminRequest, FramerLimits, Intent, NtripVersion, Request,
    SourceRequest, SubscribeRequest,
};
pub use response::Status;
