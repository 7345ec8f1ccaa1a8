// SPDX-License-Identifier: GPL-3.0-only

//! Image directory camera backend
//!
//! Every supported image file in a directory is presented as one camera
//! device. Grabbing a frame re-reads the file, so replacing the file on disk
//! changes what the station "sees". Useful for demos without hardware and for
//! tests.

use super::{CameraBackend, CameraBackendType, CameraDevice, DeviceResult, Frame, MediaStream};
use crate::constants::file_formats;
use crate::errors::DeviceError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Camera backend backed by a directory of images
#[derive(Debug, Clone)]
pub struct FileCameraBackend {
    dir: PathBuf,
}

impl FileCameraBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CameraBackend for FileCameraBackend {
    fn probe_permission(&self) -> DeviceResult<()> {
        std::fs::read_dir(&self.dir)?;
        Ok(())
    }

    fn enumerate_devices(&self) -> DeviceResult<Vec<CameraDevice>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(file_formats::is_image_extension)
            })
            .collect();
        // Sorted so station assignment is stable across runs
        files.sort();

        let devices: Vec<CameraDevice> = files
            .into_iter()
            .map(|path| CameraDevice {
                name: path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default(),
                id: path.to_string_lossy().to_string(),
            })
            .collect();

        info!(dir = %self.dir.display(), count = devices.len(), "Enumerated image files");
        Ok(devices)
    }

    fn open_stream(&self, device: &CameraDevice) -> DeviceResult<Box<dyn MediaStream>> {
        let path = PathBuf::from(&device.id);
        // Fail early like a real device open would
        std::fs::metadata(&path)?;
        debug!(path = %path.display(), "Opened file stream");
        Ok(Box::new(FileStream {
            device: device.clone(),
            path,
            stopped: false,
        }))
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Files
    }
}

struct FileStream {
    device: CameraDevice,
    path: PathBuf,
    stopped: bool,
}

impl MediaStream for FileStream {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn grab_frame(&mut self) -> DeviceResult<Frame> {
        if self.stopped {
            return Err(DeviceError::Stream("stream stopped".into()));
        }
        let bytes = std::fs::read(&self.path)?;
        if image::guess_format(&bytes).is_err() {
            return Err(DeviceError::Stream(format!(
                "{} is not a supported image",
                self.path.display()
            )));
        }
        Ok(Frame::from(bytes))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
