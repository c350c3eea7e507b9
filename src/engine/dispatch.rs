//! Delayed emission tasks

use crate::audit::{AuditLogBuffer, AuditRecord};
use crate::delay::{sample_delay, ConfigurationStore};
use crate::device::{EventSink, RawInputEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Spawns one delayed emission task per captured event
#[derive(Clone)]
pub struct Dispatcher {
    runtime: Handle,
    store: Arc<ConfigurationStore>,
    sink: Arc<dyn EventSink>,
    audit: Arc<AuditLogBuffer>,
}

impl Dispatcher {
    pub fn new(
        runtime: Handle,
        store: Arc<ConfigurationStore>,
        sink: Arc<dyn EventSink>,
        audit: Arc<AuditLogBuffer>,
    ) -> Self {
        Self {
            runtime,
            store,
            sink,
            audit,
        }
    }

    /// Spawn the emission task for `event` without waiting for it.
    ///
    /// The handle resolves to the applied delay; dropping it detaches the
    /// task. Callable from outside the runtime.
    pub fn dispatch(&self, event: RawInputEvent) -> JoinHandle<u32> {
        self.runtime.spawn(emit_delayed(
            event,
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.audit),
        ))
    }
}

async fn emit_delayed(
    event: RawInputEvent,
    store: Arc<ConfigurationStore>,
    sink: Arc<dyn EventSink>,
    audit: Arc<AuditLogBuffer>,
) -> u32 {
    // Snapshot once; later reconfiguration does not affect this event
    let params = store.read(event.class());
    let delay_ms = sample_delay(&params);

    log::debug!(
        "{} event {}={} delayed by {} ms",
        event.class(),
        event.code,
        event.value,
        delay_ms
    );

    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
    }

    if let Err(e) = sink.emit(&event) {
        log::warn!("Failed to write uinput event: {}", e);
    }

    audit.append(AuditRecord::new(&event, delay_ms));
    delay_ms
}
