// SPDX-License-Identifier: GPL-3.0-only

//! Device sharing between stations
//!
//! Stations that are assigned the same device must not open it twice; most
//! drivers refuse a second capture stream with EBUSY. [`SharedCamera`] wraps
//! any backend, opens each distinct device once and hands every station a
//! [`SharedStream`] on the same underlying stream. The device is released
//! when the last station holding it stops.

use super::{CameraBackend, CameraBackendType, CameraDevice, DeviceResult, Frame, MediaStream};
use crate::errors::DeviceError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// One open device and the stream all its holders read from
struct SharedDevice {
    stream: Mutex<Box<dyn MediaStream>>,
}

impl Drop for SharedDevice {
    fn drop(&mut self) {
        let stream = match self.stream.get_mut() {
            Ok(stream) => stream,
            Err(poisoned) => poisoned.into_inner(),
        };
        debug!(device = %stream.device(), "Last holder released device");
        stream.stop();
    }
}

/// Backend wrapper that opens each device at most once
pub struct SharedCamera {
    inner: Arc<dyn CameraBackend>,
    open: Mutex<HashMap<String, Weak<SharedDevice>>>,
}

impl SharedCamera {
    pub fn new(inner: Arc<dyn CameraBackend>) -> Self {
        Self {
            inner,
            open: Mutex::new(HashMap::new()),
        }
    }
}

fn poisoned() -> DeviceError {
    DeviceError::Stream("device registry lock poisoned".into())
}

impl CameraBackend for SharedCamera {
    fn probe_permission(&self) -> DeviceResult<()> {
        self.inner.probe_permission()
    }

    fn enumerate_devices(&self) -> DeviceResult<Vec<CameraDevice>> {
        self.inner.enumerate_devices()
    }

    fn open_stream(&self, device: &CameraDevice) -> DeviceResult<Box<dyn MediaStream>> {
        // Held across the open so two stations cannot race to open the same device
        let mut open = self.open.lock().map_err(|_| poisoned())?;
        open.retain(|_, held| held.strong_count() > 0);

        let shared = match open.get(&device.id).and_then(Weak::upgrade) {
            Some(shared) => {
                debug!(device = %device, "Sharing already open device");
                shared
            }
            None => {
                let stream = self.inner.open_stream(device)?;
                let shared = Arc::new(SharedDevice {
                    stream: Mutex::new(stream),
                });
                open.insert(device.id.clone(), Arc::downgrade(&shared));
                shared
            }
        };

        Ok(Box::new(SharedStream {
            device: device.clone(),
            shared: Some(shared),
        }))
    }

    fn backend_type(&self) -> CameraBackendType {
        self.inner.backend_type()
    }
}

/// A station's handle on a possibly shared device
pub struct SharedStream {
    device: CameraDevice,
    shared: Option<Arc<SharedDevice>>,
}

impl MediaStream for SharedStream {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn grab_frame(&mut self) -> DeviceResult<Frame> {
        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| DeviceError::Stream("stream stopped".into()))?;
        let mut stream = shared.stream.lock().map_err(|_| poisoned())?;
        stream.grab_frame()
    }

    fn stop(&mut self) {
        self.shared.take();
    }
}
