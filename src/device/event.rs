//! Input event types shared by capture, dispatch and the audit log

use serde::{Deserialize, Serialize};
use std::fmt;

/// Synchronization marker delimiting a batch of events
pub const EV_SYN: u16 = 0x00;
/// Key and button events
pub const EV_KEY: u16 = 0x01;
/// Relative movement (mouse motion, wheel)
pub const EV_REL: u16 = 0x02;
/// Miscellaneous events such as scan codes
pub const EV_MSC: u16 = 0x04;
/// Code of the report marker that terminates a batch
pub const SYN_REPORT: u16 = 0x00;
/// Code of the marker the kernel sends after its event buffer overflowed
pub const SYN_DROPPED: u16 = 0x03;

/// Coarse category of an input event, used to select delay parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    /// Key presses and mouse clicks
    Key,
    /// Relative movement
    Move,
    /// Anything else that is not filtered out
    Other,
}

impl EventClass {
    /// Classify a kernel event type
    pub fn from_event_type(event_type: u16) -> Self {
        match event_type {
            EV_KEY => Self::Key,
            EV_REL => Self::Move,
            _ => Self::Other,
        }
    }

    /// The class whose delay parameters apply to this class.
    ///
    /// Other events (e.g. `EV_MSC` scan codes) travel alongside key presses
    /// and share the key parameters.
    pub fn parameter_class(self) -> Self {
        match self {
            Self::Move => Self::Move,
            Self::Key | Self::Other => Self::Key,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Move => "move",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event captured from the physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    /// Kernel event type (`EV_KEY`, `EV_REL`, ...)
    pub event_type: u16,
    /// Event code (key code, axis, ...)
    pub code: u16,
    /// Event value (0/1/2 for keys, offset for movement)
    pub value: i32,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl RawInputEvent {
    pub fn new(event_type: u16, code: u16, value: i32, timestamp_ms: u64) -> Self {
        Self {
            event_type,
            code,
            value,
            timestamp_ms,
        }
    }

    /// Key/button event
    pub fn key(code: u16, value: i32, timestamp_ms: u64) -> Self {
        Self::new(EV_KEY, code, value, timestamp_ms)
    }

    /// Relative movement event
    pub fn movement(code: u16, value: i32, timestamp_ms: u64) -> Self {
        Self::new(EV_REL, code, value, timestamp_ms)
    }

    /// `SYN_REPORT` marker
    pub fn sync(timestamp_ms: u64) -> Self {
        Self::new(EV_SYN, SYN_REPORT, 0, timestamp_ms)
    }

    pub fn class(&self) -> EventClass {
        EventClass::from_event_type(self.event_type)
    }

    pub fn is_sync(&self) -> bool {
        self.event_type == EV_SYN
    }
}
