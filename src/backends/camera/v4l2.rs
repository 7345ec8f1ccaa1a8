// SPDX-License-Identifier: GPL-3.0-only

//! Video4Linux camera backend
//!
//! Every opened device runs a capture loop that keeps dequeuing its
//! memory-mapped buffers and publishes the newest one, so a grab returns the
//! current picture without blocking. MJPEG is requested so frames can be
//! forwarded without re-encoding; devices that only offer YUYV are converted
//! on grab.

use super::format_converters::{encode_jpeg, yuyv_to_rgb};
use super::frame_loop::{CaptureLoop, FrameSlot, LoopAction, frame_slot};
use super::{CameraBackend, CameraBackendType, CameraDevice, DeviceResult, Frame, MediaStream};
use crate::constants::capture::{
    BUFFER_COUNT, FRAME_HEIGHT, FRAME_WIDTH, MAX_DEQUEUE_FAILURES, MAX_FRAME_AGE, OPEN_ATTEMPTS,
    OPEN_RETRY_DELAY,
};
use crate::errors::DeviceError;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

const MJPG: &[u8; 4] = b"MJPG";
const YUYV: &[u8; 4] = b"YUYV";

/// Native V4L2 backend
#[derive(Debug, Default)]
pub struct V4l2Backend;

impl V4l2Backend {
    pub fn new() -> Self {
        Self
    }
}

fn open_device(path: &str) -> DeviceResult<Device> {
    Device::with_path(path).map_err(|e| match DeviceError::from(e) {
        DeviceError::PermissionDenied(msg) => DeviceError::PermissionDenied(format!("{}: {}", path, msg)),
        DeviceError::InUse(msg) => DeviceError::InUse(format!("{}: {}", path, msg)),
        DeviceError::NotFound(msg) => DeviceError::NotFound(format!("{}: {}", path, msg)),
        other => other,
    })
}

impl CameraBackend for V4l2Backend {
    fn probe_permission(&self) -> DeviceResult<()> {
        let devices = self.enumerate_devices()?;
        let first = devices.first().ok_or(DeviceError::NoDevices)?;
        // Opening and dropping the handle is enough to surface EACCES
        drop(open_device(&first.id)?);
        debug!(device = %first, "Camera permission probe succeeded");
        Ok(())
    }

    fn enumerate_devices(&self) -> DeviceResult<Vec<CameraDevice>> {
        let mut nodes = v4l::context::enum_devices();
        nodes.sort_by_key(|node| node.index());

        let mut devices = Vec::new();
        for node in nodes {
            let path = node.path().to_string_lossy().to_string();
            // Skip metadata nodes, which enumerate alongside capture nodes
            let capture_capable = Device::with_path(&path)
                .and_then(|dev| dev.query_caps())
                .map(|caps| caps.capabilities.contains(Flags::VIDEO_CAPTURE))
                .unwrap_or(true);
            if !capture_capable {
                debug!(path, "Skipping non-capture node");
                continue;
            }
            devices.push(CameraDevice {
                name: node.name().unwrap_or_else(|| path.clone()),
                id: path,
            });
        }

        info!(count = devices.len(), "Enumerated V4L2 devices");
        Ok(devices)
    }

    fn open_stream(&self, device: &CameraDevice) -> DeviceResult<Box<dyn MediaStream>> {
        // A loop stopped a moment ago may still hold the device
        let mut attempt = 1;
        loop {
            match V4l2Stream::start(device) {
                Err(DeviceError::InUse(msg)) if attempt < OPEN_ATTEMPTS => {
                    debug!(device = %device, attempt, error = %msg, "Device busy, retrying");
                    attempt += 1;
                    std::thread::sleep(OPEN_RETRY_DELAY);
                }
                result => return result.map(|stream| Box::new(stream) as Box<dyn MediaStream>),
            }
        }
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }
}

#[derive(Debug, Clone, Copy)]
enum PixelFormat {
    Mjpeg,
    Yuyv,
}

/// Format negotiated when the stream was opened
#[derive(Debug, Clone, Copy)]
struct StreamFormat {
    pixel_format: PixelFormat,
    width: u32,
    height: u32,
}

fn negotiate_format(dev: &Device, device: &CameraDevice) -> DeviceResult<StreamFormat> {
    let mut format = dev.format()?;
    format.width = FRAME_WIDTH;
    format.height = FRAME_HEIGHT;
    format.fourcc = FourCC::new(MJPG);
    let format = match dev.set_format(&format) {
        Ok(format) => format,
        Err(e) => {
            warn!(device = %device, error = %e, "Failed to set MJPEG format, using current format");
            dev.format()?
        }
    };

    let pixel_format = if format.fourcc == FourCC::new(MJPG) {
        PixelFormat::Mjpeg
    } else if format.fourcc == FourCC::new(YUYV) {
        PixelFormat::Yuyv
    } else {
        return Err(DeviceError::Stream(format!(
            "unsupported pixel format {}",
            format.fourcc
        )));
    };

    Ok(StreamFormat {
        pixel_format,
        width: format.width,
        height: format.height,
    })
}

/// Station stream backed by a capture loop thread
struct V4l2Stream {
    device: CameraDevice,
    capture: Option<CaptureLoop>,
    frames: FrameSlot,
    format: StreamFormat,
}

impl V4l2Stream {
    fn start(device: &CameraDevice) -> DeviceResult<Self> {
        let (publisher, frames) = frame_slot();
        let init_device = device.clone();
        let loop_device = device.clone();
        let mut failures = 0u32;

        let (capture, format) = CaptureLoop::start_with_init(
            &format!("v4l2-capture {}", device.id),
            move || {
                let dev = open_device(&init_device.id)?;
                let format = negotiate_format(&dev, &init_device)?;
                let stream = Stream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)?;
                Ok((stream, format))
            },
            move |stream: &mut Stream<'static>| match stream.next() {
                Ok((buf, meta)) => {
                    failures = 0;
                    let used = (meta.bytesused as usize).min(buf.len());
                    if used > 0 {
                        publisher.publish(&buf[..used]);
                    }
                    LoopAction::Continue
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_DEQUEUE_FAILURES {
                        warn!(device = %loop_device, error = %e, "Dequeue keeps failing, stopping capture");
                        LoopAction::Stop
                    } else {
                        debug!(device = %loop_device, error = %e, "Dequeue failed");
                        LoopAction::Continue
                    }
                }
            },
        )?;

        info!(
            device = %device,
            width = format.width,
            height = format.height,
            format = ?format.pixel_format,
            "Opened V4L2 stream"
        );

        Ok(Self {
            device: device.clone(),
            capture: Some(capture),
            frames,
            format,
        })
    }
}

impl MediaStream for V4l2Stream {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn grab_frame(&mut self) -> DeviceResult<Frame> {
        if self.capture.is_none() {
            return Err(DeviceError::Stream("stream stopped".into()));
        }
        let data = self.frames.latest(MAX_FRAME_AGE)?;

        let StreamFormat {
            pixel_format,
            width,
            height,
        } = self.format;
        match pixel_format {
            PixelFormat::Mjpeg => Ok(Frame::from(data.to_vec())),
            PixelFormat::Yuyv => {
                let rgb = yuyv_to_rgb(&data, width, height);
                Ok(Frame::from(encode_jpeg(&rgb, width, height)?))
            }
        }
    }

    fn stop(&mut self) {
        // The loop thread drops the stream, which issues STREAMOFF and unmaps the buffers
        if let Some(capture) = self.capture.take() {
            capture.request_stop();
            debug!(device = %self.device, "Stopped V4L2 stream");
        }
    }
}
