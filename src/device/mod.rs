//! Physical and virtual input device capabilities
//!
//! The engine only talks to devices through [`EventSource`] and
//! [`EventSink`]. On Linux these are backed by evdev (grabbed physical
//! device) and uinput (virtual clone); [`memory`] provides in-process
//! implementations for tests and dry runs.

mod event;
pub mod memory;

#[cfg(target_os = "linux")]
pub mod evdev_device;

pub use event::{
    EventClass, RawInputEvent, EV_KEY, EV_MSC, EV_REL, EV_SYN, SYN_DROPPED, SYN_REPORT,
};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The input device could not be opened
    #[error("Failed to open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Exclusive access to the input device was refused
    #[error("Failed to grab device: {0}")]
    Grab(#[source] io::Error),
    /// The uinput clone could not be created
    #[error("Failed to create uinput device: {0}")]
    VirtualDevice(#[source] io::Error),
    /// Reading the next event failed
    #[error("Failed to read input event: {0}")]
    Read(#[source] io::Error),
}

/// Result of waiting for the next event from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextEvent {
    Event(RawInputEvent),
    /// The device went away; no further events will arrive
    Disconnected,
}

/// A blocking source of captured input events
pub trait EventSource {
    /// Block until the next event is available
    fn next_event(&mut self) -> Result<NextEvent, DeviceError>;
}

/// A device that delayed events are emitted to.
///
/// Shared by every in-flight emission task.
pub trait EventSink: Send + Sync {
    /// Write `event` followed by a `SYN_REPORT` marker
    fn emit(&self, event: &RawInputEvent) -> io::Result<()>;
}
