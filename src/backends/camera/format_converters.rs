// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for raw camera frames
//!
//! Devices that cannot deliver MJPEG hand out packed YUV 4:2:2; those frames
//! are converted to RGB and JPEG-encoded before they are stored in a slot.

use crate::constants::capture::JPEG_QUALITY;
use crate::errors::DeviceError;
use image::codecs::jpeg::JpegEncoder;

/// Convert YUYV (YUV 4:2:2) to RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    // Short buffers (truncated frames) are padded black
    rgb.resize(pixel_count * 3, 0);
    rgb
}

/// Encode packed RGB as JPEG
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DeviceError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .encode(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| DeviceError::Stream(format!("JPEG encoding failed: {}", e)))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray() {
        // Neutral chroma: RGB equals luma
        let data = [100, 128, 200, 128];
        let rgb = yuyv_to_rgb(&data, 2, 1);
        assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_pads_truncated_frame() {
        let rgb = yuyv_to_rgb(&[50, 128, 50, 128], 4, 1);
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[6..], &[0; 6]);
    }

    #[test]
    fn test_encode_jpeg_signature() {
        let rgb = vec![128u8; 8 * 8 * 3];
        let jpeg = encode_jpeg(&rgb, 8, 8).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }
}
