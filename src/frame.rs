// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoded frames and their pixel buffers.

use std::time::Duration;

use image::{Rgba, RgbaImage};

use crate::error::{OverlayError, Result};

/// Byte layout of a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit RGB.
    Rgb8,
    /// Packed 8-bit RGBA.
    Rgba8,
    /// Packed 8-bit BGRA, the usual layout of camera and decoder output.
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }
}

/// Raw interleaved pixel data with dimensions and layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes. The length must be `width * height * channels`.
    ///
    /// # Errors
    ///
    /// Returns `ImageError` if the byte length does not match the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(OverlayError::ImageError(format!(
                "{width}x{height} {format:?} buffer needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A buffer with every pixel set to the same RGBA value, stored as `format`.
    #[must_use]
    pub fn filled(width: u32, height: u32, format: PixelFormat, rgba: [u8; 4]) -> Self {
        let image = RgbaImage::from_pixel(width, height, Rgba(rgba));
        Self::from_rgba(&image, format)
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Convert to a drawable RGBA image. Lossless for every [`PixelFormat`].
    ///
    /// # Errors
    ///
    /// Returns `AnnotationError` if the buffer is inconsistent with its dimensions.
    pub fn to_rgba(&self) -> Result<RgbaImage> {
        let pixels = self.width as usize * self.height as usize;
        if self.data.len() != pixels * self.format.channels() {
            return Err(OverlayError::AnnotationError(format!(
                "buffer of {} bytes does not hold {}x{} {:?} pixels",
                self.data.len(),
                self.width,
                self.height,
                self.format
            )));
        }

        let raw = match self.format {
            PixelFormat::Rgba8 => self.data.clone(),
            PixelFormat::Bgra8 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0], px[3]])
                .collect(),
            PixelFormat::Rgb8 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[0], px[1], px[2], 255])
                .collect(),
        };

        RgbaImage::from_raw(self.width, self.height, raw).ok_or_else(|| {
            OverlayError::AnnotationError("failed to create RGBA image from buffer".to_string())
        })
    }

    /// Convert an RGBA image back into `format`. Alpha is dropped for `Rgb8`.
    #[must_use]
    pub fn from_rgba(image: &RgbaImage, format: PixelFormat) -> Self {
        let raw = image.as_raw();
        let data = match format {
            PixelFormat::Rgba8 => raw.clone(),
            PixelFormat::Bgra8 => raw
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0], px[3]])
                .collect(),
            PixelFormat::Rgb8 => raw
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        Self {
            width: image.width(),
            height: image.height(),
            format,
            data,
        }
    }
}

/// One decoded video frame.
///
/// Frames are immutable once produced; the pipeline replaces the buffer of an
/// annotated frame rather than editing it in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Pixel data.
    pub buffer: PixelBuffer,
    /// Presentation timestamp relative to the start of the source.
    pub pts: Duration,
    /// Position of the frame in the source, starting at 0.
    pub index: u64,
}

impl Frame {
    #[must_use]
    pub const fn new(buffer: PixelBuffer, pts: Duration, index: u64) -> Self {
        Self { buffer, pts, index }
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.buffer.width()
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// Same timestamp and index, new pixels.
    #[must_use]
    pub fn with_buffer(&self, buffer: PixelBuffer) -> Self {
        Self {
            buffer,
            pts: self.pts,
            index: self.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(format: PixelFormat) -> PixelBuffer {
        let image = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 7, 200]));
        PixelBuffer::from_rgba(&image, format)
    }

    #[test]
    fn test_bgra_round_trip_is_lossless() {
        let buffer = gradient(PixelFormat::Bgra8);
        assert_eq!(&buffer.data()[..4], &[7, 0, 0, 200]);
        let image = buffer.to_rgba().unwrap();
        assert_eq!(image.get_pixel(1, 2), &Rgba([40, 120, 7, 200]));
        assert_eq!(PixelBuffer::from_rgba(&image, PixelFormat::Bgra8), buffer);
    }

    #[test]
    fn test_rgb_is_opaque_after_conversion() {
        let buffer = gradient(PixelFormat::Rgb8);
        assert_eq!(buffer.data().len(), 4 * 3 * 3);
        let image = buffer.to_rgba().unwrap();
        assert_eq!(image.get_pixel(3, 0), &Rgba([120, 0, 7, 255]));
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        let err = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(err, OverlayError::ImageError(_)));
        assert!(PixelBuffer::new(2, 2, PixelFormat::Rgb8, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_with_buffer_keeps_timing() {
        let frame = Frame::new(gradient(PixelFormat::Rgba8), Duration::from_millis(40), 1);
        let replaced = frame.with_buffer(PixelBuffer::filled(4, 3, PixelFormat::Rgba8, [0; 4]));
        assert_eq!(replaced.pts, Duration::from_millis(40));
        assert_eq!(replaced.index, 1);
        assert_ne!(replaced.buffer, frame.buffer);
    }
}
