use image::GrayImage;

/// Ink value written for pixels below the threshold.
pub const BLACK: u8 = 0;
/// Paper value written for pixels at or above the threshold.
pub const WHITE: u8 = 255;

/// Convert a grayscale image to a 0/255 image using Otsu's thresholding method
pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let threshold = otsu_threshold(gray.as_raw());
    threshold_binarize(gray, threshold)
}

/// Calculate Otsu's optimal threshold
///
/// Pixels strictly below the returned value form the dark class. Returns 128
/// when the histogram cannot be split (uniform or empty input).
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &pixel in gray {
        histogram[pixel as usize] += 1;
    }

    let total_pixels = gray.len() as u64;
    let total_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(intensity, &count)| intensity as u64 * count)
        .sum();

    let mut max_variance = 0.0f64;
    let mut optimal_threshold = 128u8;

    // Running sums over the dark class [0, threshold).
    let mut class1_pixels = 0u64;
    let mut class1_sum = 0u64;

    for threshold in 1..=255usize {
        class1_pixels += histogram[threshold - 1];
        class1_sum += (threshold as u64 - 1) * histogram[threshold - 1];

        let class2_pixels = total_pixels - class1_pixels;
        if class1_pixels == 0 || class2_pixels == 0 {
            continue;
        }
        let class2_sum = total_sum - class1_sum;

        let class1_mean = class1_sum as f64 / class1_pixels as f64;
        let class2_mean = class2_sum as f64 / class2_pixels as f64;

        let weight1 = class1_pixels as f64 / total_pixels as f64;
        let weight2 = class2_pixels as f64 / total_pixels as f64;

        let variance = weight1 * weight2 * (class1_mean - class2_mean).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    optimal_threshold
}

/// Simple global threshold binarization
pub fn threshold_binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut binary = gray.clone();
    for pixel in binary.pixels_mut() {
        pixel[0] = if pixel[0] < threshold { BLACK } else { WHITE };
    }
    binary
}
