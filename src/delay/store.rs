//! Live delay parameters shared by emission tasks and the reconfiguration
//! listener

use super::DelayParameters;
use crate::device::EventClass;
use std::sync::{PoisonError, RwLock};

/// Current [`DelayParameters`] for key and movement events.
///
/// One writer (the reconfiguration listener) and many readers (emission
/// tasks). Each class sits behind its own short-lived lock, so a reader
/// always sees a complete parameter set; there is no versioning across
/// classes or across reads.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    key: RwLock<DelayParameters>,
    movement: RwLock<DelayParameters>,
}

impl ConfigurationStore {
    pub fn new(key: DelayParameters, movement: DelayParameters) -> Self {
        Self {
            key: RwLock::new(key.clamped()),
            movement: RwLock::new(movement.clamped()),
        }
    }

    fn slot(&self, class: EventClass) -> &RwLock<DelayParameters> {
        match class.parameter_class() {
            EventClass::Move => &self.movement,
            _ => &self.key,
        }
    }

    /// Snapshot of the parameters for `class`
    pub fn read(&self, class: EventClass) -> DelayParameters {
        *self
            .slot(class)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the parameters for `class`, raising max to min if needed
    pub fn write(&self, class: EventClass, params: DelayParameters) {
        *self
            .slot(class)
            .write()
            .unwrap_or_else(PoisonError::into_inner) = params.clamped();
    }

    /// Replace only the bounds for `class`; returns what was published.
    ///
    /// See [`DelayParameters::with_bounds`] for how a normal mean is kept
    /// inside the new bounds.
    pub fn set_bounds(
        &self,
        class: EventClass,
        min_delay_ms: u32,
        max_delay_ms: u32,
    ) -> DelayParameters {
        let mut slot = self
            .slot(class)
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = slot.with_bounds(min_delay_ms, max_delay_ms);
        *slot
    }
}
