//! Delay Daemon - adds latency to Linux input devices
//!
//! Grabs a physical keyboard or mouse, and re-emits every event on a virtual
//! device after an artificial delay. Delay bounds can be changed at runtime
//! through a named pipe, which makes the daemon useful for latency studies.

pub mod audit;
pub mod config;
pub mod delay;
pub mod device;
pub mod engine;
pub mod report;
pub mod shutdown;

pub use config::Config;

/// Crate version, reported by the CLI and in session reports
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
