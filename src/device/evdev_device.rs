//! evdev-backed capture and uinput-backed emission for Linux
//!
//! The physical device is grabbed so that only the delayed copies emitted
//! on the virtual clone reach the rest of the system.

use super::{DeviceError, EventSink, EventSource, NextEvent, RawInputEvent};
use chrono::{DateTime, Utc};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{Device, EventType, InputEvent};
use nix::errno::Errno;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Open `path`, create its virtual clone and grab the physical device.
///
/// The clone is created before grabbing so a failure leaves the physical
/// device usable.
pub fn open(path: &Path) -> Result<(EvdevSource, UinputSink), DeviceError> {
    let mut device = Device::open(path).map_err(|source| DeviceError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let sink = UinputSink::clone_of(&device)?;
    device.grab().map_err(DeviceError::Grab)?;

    log::info!(
        "Grabbed {} ({})",
        device.name().unwrap_or("unnamed device"),
        path.display()
    );

    Ok((EvdevSource::new(device), sink))
}

/// Grabbed physical input device
pub struct EvdevSource {
    device: Device,
    pending: VecDeque<InputEvent>,
}

impl EvdevSource {
    fn new(device: Device) -> Self {
        Self {
            device,
            pending: VecDeque::with_capacity(64),
        }
    }
}

impl EventSource for EvdevSource {
    fn next_event(&mut self) -> Result<NextEvent, DeviceError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(NextEvent::Event(convert(&event)));
            }

            // Blocks until the kernel has a batch; dropped SYN batches are
            // resynchronised by evdev before they are returned.
            match self.device.fetch_events() {
                Ok(events) => self.pending.extend(events),
                Err(e) if e.raw_os_error() == Some(Errno::ENODEV as i32) => {
                    log::info!("Device disconnected: {}", e);
                    return Ok(NextEvent::Disconnected);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DeviceError::Read(e)),
            }
        }
    }
}

fn convert(event: &InputEvent) -> RawInputEvent {
    let captured: DateTime<Utc> = event.timestamp().into();
    RawInputEvent::new(
        event.event_type().0,
        event.code(),
        event.value(),
        u64::try_from(captured.timestamp_millis()).unwrap_or(0),
    )
}

/// uinput clone of the physical device
pub struct UinputSink {
    device: Mutex<VirtualDevice>,
}

impl UinputSink {
    /// Create a virtual device with the key and relative axis capabilities
    /// of `source`.
    pub fn clone_of(source: &Device) -> Result<Self, DeviceError> {
        let name = format!("{} (delayed)", source.name().unwrap_or("input device"));
        let mut builder = VirtualDeviceBuilder::new()
            .map_err(DeviceError::VirtualDevice)?
            .name(&name);

        if let Some(keys) = source.supported_keys() {
            builder = builder.with_keys(keys).map_err(DeviceError::VirtualDevice)?;
        }
        if let Some(axes) = source.supported_relative_axes() {
            builder = builder
                .with_relative_axes(axes)
                .map_err(DeviceError::VirtualDevice)?;
        }

        let device = builder.build().map_err(DeviceError::VirtualDevice)?;
        Ok(Self {
            device: Mutex::new(device),
        })
    }
}

impl EventSink for UinputSink {
    fn emit(&self, event: &RawInputEvent) -> io::Result<()> {
        let message = InputEvent::new(EventType(event.event_type), event.code, event.value);
        // VirtualDevice::emit terminates the batch with SYN_REPORT
        self.device
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(&[message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn open_missing_device_reports_path() {
        let result = open(Path::new("/nonexistent/input/event99"));
        match result {
            Err(DeviceError::Open { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/input/event99"))
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("opened a nonexistent device"),
        }
    }

    #[test]
    fn convert_keeps_fields_and_millisecond_timestamp() {
        let event = InputEvent::new(EventType::KEY, 30, 1);
        let converted = convert(&event);
        assert_eq!(converted.event_type, 1);
        assert_eq!(converted.code, 30);
        assert_eq!(converted.value, 1);

        let expected = event
            .timestamp()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64;
        assert_eq!(converted.timestamp_ms, expected);
    }
}
