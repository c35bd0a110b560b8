//! Noise suppression filters.

use image::{GrayImage, RgbImage};
use imageproc::filter::median_filter;

/// Median blur with a square `ksize` x `ksize` window on a grayscale image.
///
/// `ksize` must be odd; a size of 1 returns a copy.
pub fn median_blur_gray(gray: &GrayImage, ksize: u32) -> GrayImage {
    let radius = ksize / 2;
    if radius == 0 {
        return gray.clone();
    }
    median_filter(gray, radius, radius)
}

/// Per-channel median blur on a color image.
pub fn median_blur_rgb(rgb: &RgbImage, ksize: u32) -> RgbImage {
    let radius = ksize / 2;
    if radius == 0 {
        return rgb.clone();
    }
    median_filter(rgb, radius, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_removes_salt_noise() {
        let mut gray = GrayImage::from_pixel(9, 9, image::Luma([200]));
        gray.put_pixel(4, 4, image::Luma([0]));
        gray.put_pixel(1, 6, image::Luma([255]));

        let smoothed = median_blur_gray(&gray, 5);
        assert_eq!(smoothed.get_pixel(4, 4)[0], 200);
        assert_eq!(smoothed.get_pixel(1, 6)[0], 200);
    }

    #[test]
    fn test_median_keeps_edges() {
        // Left half dark, right half light: a median keeps the step
        let gray = GrayImage::from_fn(10, 10, |x, _| image::Luma([if x < 5 { 10 } else { 240 }]));
        let smoothed = median_blur_gray(&gray, 5);
        assert_eq!(smoothed.get_pixel(1, 5)[0], 10);
        assert_eq!(smoothed.get_pixel(8, 5)[0], 240);
    }

    #[test]
    fn test_ksize_one_is_copy() {
        let gray = GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 16 + y) as u8]));
        assert_eq!(median_blur_gray(&gray, 1), gray);
    }
}
