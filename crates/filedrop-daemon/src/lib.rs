//! Filedrop host layer.
//!
//! Owns the local identity for the process lifetime, keeps exactly one
//! service record registered for it (tearing it down and re-registering when
//! the user renames themselves), hosts the discovery browser, and fans peer
//! events out to the application layer.

pub mod config;
pub mod daemon;
pub mod error;
pub mod setup;

pub use config::Config;
pub use daemon::{Daemon, DaemonCommand, DaemonStatus};
pub use error::DaemonError;
