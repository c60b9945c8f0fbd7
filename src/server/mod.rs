//! Caster server
//!
//! [`CasterServer`] accepts connections and hands each one to a
//! [`Connection`](connection::Connection) task.

pub mod admin;
pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::{CasterServer, ServerCounters};
