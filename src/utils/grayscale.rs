/// Convert RGB pixels to luminance
/// Y = 0.299*R + 0.587*G + 0.114*B
/// Uses fast integer arithmetic: Y = (76*R + 150*G + 29*B) >> 8
use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// Coefficients for grayscale conversion: Y = (76*R + 150*G + 29*B) >> 8
const COEF_R: u32 = 76;
const COEF_G: u32 = 150;
const COEF_B: u32 = 29;

/// Images at or above this many pixels are converted row-parallel
const PARALLEL_PIXELS: usize = 1 << 20;

#[inline]
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let lum = (COEF_R * r as u32 + COEF_G * g as u32 + COEF_B * b as u32) >> 8;
    lum.min(255) as u8
}

/// Convert interleaved RGB bytes to grayscale
pub fn rgb_to_grayscale(rgb: &[u8], width: usize, height: usize) -> Vec<u8> {
    let pixel_count = width * height;
    rgb.chunks_exact(3)
        .take(pixel_count)
        .map(|px| luminance(px[0], px[1], px[2]))
        .collect()
}

/// Convert RGB to grayscale using parallel processing
/// Processes rows in parallel for multi-core speedup
pub fn rgb_to_grayscale_parallel(rgb: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut gray = vec![0u8; width * height];
    if width == 0 {
        return gray;
    }

    gray.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let row_start = y * width * 3;
        for (x, out) in row.iter_mut().enumerate() {
            let idx = row_start + x * 3;
            *out = luminance(rgb[idx], rgb[idx + 1], rgb[idx + 2]);
        }
    });

    gray
}

/// Luminance plane of a color image
pub fn luma(rgb: &RgbImage) -> GrayImage {
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let gray = if width * height >= PARALLEL_PIXELS {
        rgb_to_grayscale_parallel(rgb.as_raw(), width, height)
    } else {
        rgb_to_grayscale(rgb.as_raw(), width, height)
    };
    // Length is width * height by construction.
    GrayImage::from_raw(rgb.width(), rgb.height(), gray)
        .unwrap_or_else(|| GrayImage::new(rgb.width(), rgb.height()))
}
