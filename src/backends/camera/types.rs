// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CameraBackendType {
    /// Video4Linux capture devices (`/dev/video*`)
    #[default]
    V4l2,
    /// Image files in a directory, one file per device
    Files,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "V4L2"),
            CameraBackendType::Files => write!(f, "Files"),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Stable identifier (device path or file path)
    pub id: String,
    /// Human readable name
    pub name: String,
}

impl std::fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// An encoded still image (JPEG/PNG/...)
///
/// The bytes are shared, so frames can be copied into slots and snapshots
/// without duplicating the image data.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Arc<[u8]>,
}

impl Frame {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// Get the length of the encoded image in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Detected image format, if the bytes carry a known signature
    pub fn image_format(&self) -> Option<image::ImageFormat> {
        image::guess_format(&self.data).ok()
    }

    /// MIME type for uploads (defaults to JPEG)
    pub fn mime_type(&self) -> &'static str {
        self.image_format()
            .map(|format| format.to_mime_type())
            .unwrap_or("image/jpeg")
    }

    /// File name for uploads, with an extension matching the content
    pub fn file_name(&self, stem: &str) -> String {
        let ext = self
            .image_format()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("jpg");
        format!("{}.{}", stem, ext)
    }

    /// Decode to RGB for display
    pub fn decode_rgb(&self) -> Option<image::RgbImage> {
        image::load_from_memory(&self.data)
            .ok()
            .map(|img| img.to_rgb8())
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({} bytes)", self.data.len())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn test_mime_type_from_signature() {
        let png = Frame::new(PNG_SIGNATURE.to_vec());
        assert_eq!(png.mime_type(), "image/png");
        assert_eq!(png.file_name("capture"), "capture.png");

        let unknown = Frame::new(vec![1, 2, 3]);
        assert_eq!(unknown.mime_type(), "image/jpeg");
        assert_eq!(unknown.file_name("capture"), "capture.jpg");
    }
}
