//! The delay engine
//!
//! The capture loop reads the grabbed device on its own thread and hands
//! each event to the [`Dispatcher`], which spawns one task per event:
//! snapshot parameters, sample a delay, sleep, emit, append to the audit
//! log. The reconfiguration listener updates the parameter store from a
//! named pipe while all of this runs.
//!
//! Tasks are spawned without a bound, one per captured event, and events
//! can be emitted in a different order than they were captured when a
//! later event draws a shorter delay.

mod capture;
mod dispatch;
mod reconfig;

pub use capture::{CaptureEnd, CaptureLoop, CaptureReport, EventFilter};
pub use dispatch::Dispatcher;
pub use reconfig::{
    parse_message, DelayUpdate, ListenerStats, ReconfigError, ReconfigListener,
    MESSAGE_BUFFER_LEN,
};

#[cfg(target_os = "linux")]
pub use reconfig::{ChannelError, ReconfigChannel};
