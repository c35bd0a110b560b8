//! Pixel kernels used by the preprocessing stage
//!
//! This module provides the low-level image operations behind each transform:
//! - Grayscale conversion (RGB to luminance)
//! - Binarization (Otsu's method and fixed threshold)
//! - Median filtering (noise suppression)

/// Otsu and fixed-threshold binarization
pub mod binarization;
/// Median filtering
pub mod filter;
/// RGB to luminance conversion
pub mod grayscale;
