// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion helpers for capture backends
//!
//! Backends hand the session manager finished files, so raw frames that are
//! not already JPEG go through these helpers before hitting disk.

use image::RgbImage;

/// Convert YUYV (YUV 4:2:2) to packed RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients. Short input leaves the remaining pixels black.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    'outer: for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break 'outer;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb.resize(pixel_count * 3, 0);
    rgb
}

/// Encode packed RGB as JPEG at the given quality (1-100)
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, String> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() != expected {
        return Err(format!(
            "RGB buffer is {} bytes, expected {} for {}x{}",
            rgb.len(),
            expected,
            width,
            height
        ));
    }

    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);

    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    encoder
        .encode(rgb, width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;

    Ok(buffer)
}

/// Encode an [`RgbImage`] as JPEG
pub fn encode_rgb_image(image: &RgbImage, quality: u8) -> Result<Vec<u8>, String> {
    encode_jpeg(image.as_raw(), image.width(), image.height(), quality)
}

/// Check for the JPEG start-of-image marker
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF
}
