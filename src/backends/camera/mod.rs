// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! Local cameras are reached through a [`CameraBackend`], which enumerates
//! devices and opens one [`MediaStream`] per station. Backends are wrapped
//! in [`shared::SharedCamera`] so stations assigned the same device share
//! one open stream.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Inspector (source  │
//! │  selector handlers) │
//! └──────────┬──────────┘
//!            │ probe / enumerate / open
//!            ▼
//! ┌─────────────────────┐
//! │ CameraBackend Trait │
//! └──────────┬──────────┘
//!            │
//! ┌──────────┴──────────┐
//! │    SharedCamera     │
//! └──────────┬──────────┘
//!            │
//!      ┌─────┴──────┐
//!      ▼            ▼
//!   ┌──────┐    ┌───────┐
//!   │ V4L2 │    │ Files │
//!   └──────┘    └───────┘
//! ```
//!
//! All calls may block on device I/O, so the inspector runs them on the
//! blocking thread pool.

pub mod file_source;
pub mod format_converters;
pub mod frame_loop;
pub mod shared;
pub mod types;
pub mod v4l2;

pub use types::*;

use crate::config::Config;
use crate::errors::DeviceError;
use std::sync::Arc;
use tracing::warn;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Local camera backend
pub trait CameraBackend: Send + Sync {
    /// Open and immediately close a stream to surface permission problems
    /// before any station stream is requested
    fn probe_permission(&self) -> DeviceResult<()>;

    /// Enumerate available camera devices
    fn enumerate_devices(&self) -> DeviceResult<Vec<CameraDevice>>;

    /// Open a persistent stream on `device`
    fn open_stream(&self, device: &CameraDevice) -> DeviceResult<Box<dyn MediaStream>>;

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;
}

/// A live stream bound to one station
pub trait MediaStream: Send {
    /// Device this stream was opened on
    fn device(&self) -> &CameraDevice;

    /// Rasterize the current frame to an encoded still image
    fn grab_frame(&mut self) -> DeviceResult<Frame>;

    /// Stop the stream and release the device
    fn stop(&mut self);
}

/// Create the camera backend selected in the configuration
pub fn backend_from_config(config: &Config) -> Arc<dyn CameraBackend> {
    let backend: Arc<dyn CameraBackend> = match config.camera_backend {
        CameraBackendType::V4l2 => Arc::new(v4l2::V4l2Backend::new()),
        CameraBackendType::Files => {
            let dir = config.camera_dir.clone().unwrap_or_else(|| {
                warn!("Files camera backend selected without camera_dir, using current directory");
                std::path::PathBuf::from(".")
            });
            Arc::new(file_source::FileCameraBackend::new(dir))
        }
    };
    Arc::new(shared::SharedCamera::new(backend))
}

/// Assign devices to stations
///
/// Station `i` gets device `i`; stations beyond the number of devices reuse
/// the first device (opened once, see [`shared::SharedCamera`]). Returns `None` for every station when no device exists.
pub fn assign_devices(devices: &[CameraDevice]) -> crate::station::StationMap<Option<CameraDevice>> {
    crate::station::StationMap::from_fn(|station| {
        devices
            .get(station.index())
            .or_else(|| devices.first())
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::StationId;

    fn device(n: usize) -> CameraDevice {
        CameraDevice {
            id: format!("/dev/video{}", n),
            name: format!("Camera {}", n),
        }
    }

    #[test]
    fn test_assign_devices_reuses_first() {
        let devices = vec![device(0), device(2)];
        let assigned = assign_devices(&devices);
        assert_eq!(assigned[StationId::Front], Some(device(0)));
        assert_eq!(assigned[StationId::Left], Some(device(2)));
        assert_eq!(assigned[StationId::Right], Some(device(0)));
        assert_eq!(assigned[StationId::Brake], Some(device(0)));
    }

    #[test]
    fn test_assign_devices_empty() {
        let assigned = assign_devices(&[]);
        assert!(assigned.values().all(Option::is_none));
    }
}
