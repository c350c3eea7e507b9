//! Event capture loop

use super::Dispatcher;
use crate::device::{DeviceError, EventSource, NextEvent, RawInputEvent, EV_SYN, SYN_DROPPED};
use std::collections::BTreeSet;

/// Event types that are never delayed or re-emitted.
///
/// `EV_SYN` is always dropped: a fresh `SYN_REPORT` follows every emitted
/// event. Further types (e.g. `EV_MSC`) can be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    dropped: BTreeSet<u16>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            dropped: BTreeSet::from([EV_SYN]),
        }
    }

    /// Filter that also drops `event_types`
    pub fn dropping(event_types: impl IntoIterator<Item = u16>) -> Self {
        let mut filter = Self::new();
        filter.dropped.extend(event_types);
        filter
    }

    pub fn drop_type(&mut self, event_type: u16) {
        self.dropped.insert(event_type);
    }

    pub fn accepts(&self, event: &RawInputEvent) -> bool {
        !self.dropped.contains(&event.event_type)
    }

    /// Dropped event types in ascending order
    pub fn dropped_types(&self) -> impl Iterator<Item = u16> + '_ {
        self.dropped.iter().copied()
    }
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the capture loop stopped
#[derive(Debug)]
pub enum CaptureEnd {
    /// The device was removed
    Disconnected,
    /// Reading failed
    Failed(DeviceError),
}

/// Counters for one run of the capture loop
#[derive(Debug)]
pub struct CaptureReport {
    /// Events handed to the dispatcher
    pub dispatched: u64,
    /// Events dropped by the filter
    pub filtered: u64,
    pub end: CaptureEnd,
}

/// Reads the physical device and dispatches every accepted event.
///
/// Blocking: run it on a dedicated thread.
pub struct CaptureLoop<S> {
    source: S,
    filter: EventFilter,
    dispatcher: Dispatcher,
}

impl<S: EventSource> CaptureLoop<S> {
    pub fn new(source: S, filter: EventFilter, dispatcher: Dispatcher) -> Self {
        Self {
            source,
            filter,
            dispatcher,
        }
    }

    /// Run until the device disconnects or a read fails
    pub fn run(mut self) -> CaptureReport {
        let mut dispatched = 0;
        let mut filtered = 0;

        let end = loop {
            match self.source.next_event() {
                Ok(NextEvent::Event(event)) if self.filter.accepts(&event) => {
                    // Fire and forget; the task reports its own failures
                    drop(self.dispatcher.dispatch(event));
                    dispatched += 1;
                }
                Ok(NextEvent::Event(event)) => {
                    if event.is_sync() && event.code == SYN_DROPPED {
                        log::warn!("Kernel dropped input events; some may be missing");
                    }
                    filtered += 1;
                }
                Ok(NextEvent::Disconnected) => break CaptureEnd::Disconnected,
                Err(e) => {
                    log::error!("{}", e);
                    break CaptureEnd::Failed(e);
                }
            }
        };

        log::info!(
            "Capture stopped after {} events ({} filtered)",
            dispatched,
            filtered
        );
        CaptureReport {
            dispatched,
            filtered,
            end,
        }
    }
}
