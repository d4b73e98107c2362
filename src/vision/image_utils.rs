// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading for uploaded board images

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use thiserror::Error;

/// Custom error types for image decoding
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    EmptyData,

    #[error("Unrecognized image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// Size in bytes
    pub size_bytes: usize,
}

/// Decode raw image bytes (for multipart uploads)
///
/// The container format is guessed from the content, so any format the
/// `image` crate can recognize is accepted. EXIF orientation is applied, so
/// the returned image (and every box computed on it) is in the upright frame
/// a viewer would display.
///
/// # Returns
/// * `Ok((DynamicImage, ImageInfo))` - The decoded image and metadata
/// * `Err(ImageError)` - If the bytes are empty, unrecognized or corrupt
pub fn decode_image_bytes(bytes: &[u8]) -> Result<(DynamicImage, ImageInfo), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let format = reader.format().ok_or(ImageError::UnsupportedFormat)?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let orientation = decoder
        .orientation()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;

    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    img.apply_orientation(orientation);

    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
    };

    Ok((img, info))
}

/// Get the format extension as a string
pub fn format_to_extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("unknown")
}
