use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::DecodeError;
use crate::utils::grayscale::luma;

#[derive(Debug, PartialEq)]
enum Pixels {
    Gray(GrayImage),
    Rgb(RgbImage),
}

/// Immutable 8-bit pixel buffer with 1 (grayscale) or 3 (color) channels.
///
/// Cloning is cheap: the pixels live behind an `Arc` and are never written
/// after construction. Every transform produces a new `Image`.
#[derive(Debug, Clone)]
pub struct Image {
    pixels: Arc<Pixels>,
}

impl Image {
    /// Wrap a grayscale buffer.
    pub fn from_gray(gray: GrayImage) -> Self {
        Self {
            pixels: Arc::new(Pixels::Gray(gray)),
        }
    }

    /// Wrap a color buffer.
    pub fn from_rgb(rgb: RgbImage) -> Self {
        Self {
            pixels: Arc::new(Pixels::Rgb(rgb)),
        }
    }

    /// Build an image from raw interleaved bytes.
    ///
    /// # Arguments
    /// * `width` - Image width in pixels
    /// * `height` - Image height in pixels
    /// * `channels` - 1 for grayscale, 3 for RGB
    /// * `data` - `width * height * channels` bytes
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::rejected(format!(
                "zero-sized image ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(DecodeError::rejected(format!(
                "expected {expected} bytes for {width}x{height}x{channels}, got {}",
                data.len()
            )));
        }
        let image = match channels {
            1 => GrayImage::from_raw(width, height, data).map(Self::from_gray),
            3 => RgbImage::from_raw(width, height, data).map(Self::from_rgb),
            other => {
                return Err(DecodeError::rejected(format!(
                    "unsupported channel count {other}"
                )));
            }
        };
        image.ok_or_else(|| DecodeError::rejected("pixel buffer does not match dimensions"))
    }

    /// Decode an encoded image (PNG, JPEG, ...) from memory.
    ///
    /// This is the pipeline's precondition check: empty or unparseable input
    /// is rejected here, before any stage runs.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::rejected("empty image buffer"));
        }
        let dynamic = image::load_from_memory(bytes)
            .map_err(|err| DecodeError::rejected(format!("unreadable image: {err}")))?;
        Self::from_dynamic(dynamic)
    }

    /// Read and decode an image file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|err| DecodeError::rejected(format!("cannot read {}: {err}", path.display())))?;
        Self::decode(&bytes)
    }

    /// Convert a decoded `image` crate buffer. Luma variants stay single-channel
    /// (alpha dropped), everything else is flattened to 8-bit RGB.
    pub fn from_dynamic(dynamic: DynamicImage) -> Result<Self, DecodeError> {
        if dynamic.width() == 0 || dynamic.height() == 0 {
            return Err(DecodeError::rejected(format!(
                "zero-sized image ({}x{})",
                dynamic.width(),
                dynamic.height()
            )));
        }
        Ok(match dynamic {
            DynamicImage::ImageLuma8(gray) => Self::from_gray(gray),
            DynamicImage::ImageRgb8(rgb) => Self::from_rgb(rgb),
            other if other.color().has_color() => Self::from_rgb(other.to_rgb8()),
            other => Self::from_gray(other.to_luma8()),
        })
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        match self.pixels.as_ref() {
            Pixels::Gray(g) => g.width(),
            Pixels::Rgb(c) => c.width(),
        }
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        match self.pixels.as_ref() {
            Pixels::Gray(g) => g.height(),
            Pixels::Rgb(c) => c.height(),
        }
    }

    /// Channel count: 1 or 3.
    pub fn channels(&self) -> u8 {
        match self.pixels.as_ref() {
            Pixels::Gray(_) => 1,
            Pixels::Rgb(_) => 3,
        }
    }

    /// True for single-channel images.
    pub fn is_gray(&self) -> bool {
        self.channels() == 1
    }

    /// Borrow the grayscale buffer, if this is a grayscale image.
    pub fn as_gray(&self) -> Option<&GrayImage> {
        match self.pixels.as_ref() {
            Pixels::Gray(g) => Some(g),
            Pixels::Rgb(_) => None,
        }
    }

    /// Borrow the color buffer, if this is a color image.
    pub fn as_rgb(&self) -> Option<&RgbImage> {
        match self.pixels.as_ref() {
            Pixels::Rgb(c) => Some(c),
            Pixels::Gray(_) => None,
        }
    }

    /// Raw interleaved bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        match self.pixels.as_ref() {
            Pixels::Gray(g) => g.as_raw(),
            Pixels::Rgb(c) => c.as_raw(),
        }
    }

    /// Luminance plane. Grayscale images are copied as-is.
    pub fn to_luma(&self) -> GrayImage {
        match self.pixels.as_ref() {
            Pixels::Gray(g) => g.clone(),
            Pixels::Rgb(c) => luma(c),
        }
    }

    /// True when both handles point at the same pixel allocation.
    pub fn shares_pixels(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.shares_pixels(other) || self.pixels == other.pixels
    }
}
