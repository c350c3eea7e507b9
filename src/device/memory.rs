//! In-memory device implementations
//!
//! [`ScriptedSource`] replays a fixed list of events and then reports a
//! disconnect; [`RecordingSink`] keeps everything written to it along with
//! the (tokio) time of the write, so tests can check delays and ordering.

use super::{DeviceError, EventSink, EventSource, NextEvent, RawInputEvent};
use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

/// Replays scripted events, then reports [`NextEvent::Disconnected`]
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: VecDeque<Result<RawInputEvent, DeviceError>>,
}

impl ScriptedSource {
    pub fn new(events: impl IntoIterator<Item = RawInputEvent>) -> Self {
        Self {
            script: events.into_iter().map(Ok).collect(),
        }
    }

    /// Queue another event
    pub fn push_event(&mut self, event: RawInputEvent) {
        self.script.push_back(Ok(event));
    }

    /// Queue a read failure
    pub fn push_error(&mut self, error: DeviceError) {
        self.script.push_back(Err(error));
    }

    /// Number of scripted entries not yet consumed
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl EventSource for ScriptedSource {
    fn next_event(&mut self) -> Result<NextEvent, DeviceError> {
        match self.script.pop_front() {
            Some(Ok(event)) => Ok(NextEvent::Event(event)),
            Some(Err(error)) => Err(error),
            None => Ok(NextEvent::Disconnected),
        }
    }
}

/// A single write observed by [`RecordingSink`]
#[derive(Debug, Clone, Copy)]
pub struct Emission {
    pub event: RawInputEvent,
    pub at: Instant,
}

/// Records emitted events, optionally failing every write
#[derive(Debug, Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<Emission>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every emit fails, as a vanished uinput device would
    pub fn failing() -> Self {
        Self {
            writes: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Every write, including the synthesized `SYN_REPORT` markers
    pub fn writes(&self) -> Vec<Emission> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Emitted events without the sync markers
    pub fn events(&self) -> Vec<Emission> {
        self.writes()
            .into_iter()
            .filter(|emission| !emission.event.is_sync())
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &RawInputEvent) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "virtual device gone"));
        }
        let at = Instant::now();
        let mut writes = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        writes.push(Emission { event: *event, at });
        writes.push(Emission {
            event: RawInputEvent::sync(event.timestamp_ms),
            at,
        });
        Ok(())
    }
}
