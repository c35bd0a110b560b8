//! Preprocessing transforms applied before a detector call.
//!
//! Every transform is pure: it reads an [`Image`] and returns a new one.
//! Transforms are plain data so a cascade can be described in a config file
//! and new stages can be added without touching the orchestration loop.

use std::fmt;

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::morphology::{Mask, grayscale_close};
use serde::{Deserialize, Serialize};

use crate::models::Image;
use crate::utils::binarization::otsu_binarize;
use crate::utils::filter::{median_blur_gray, median_blur_rgb};

/// Largest closing kernel side. The structuring element radius is a `u8`.
pub const MAX_CLOSE_KSIZE: u32 = 511;

/// One image-to-image step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    /// Pass the image through unchanged.
    Identity,
    /// Collapse color to a single luminance channel.
    Grayscale,
    /// Median smoothing with a square window of side `ksize` (odd).
    Median {
        /// Window side in pixels.
        ksize: u32,
    },
    /// Global Otsu binarization to a 0/255 single-channel image.
    /// Color input is converted to grayscale first.
    Otsu,
    /// Morphological closing with a `ksize` x `ksize` rectangle (odd).
    /// Keeps the channel count of its input.
    MorphClose {
        /// Kernel side in pixels.
        ksize: u32,
    },
}

impl Transform {
    /// Apply the transform.
    pub fn apply(&self, image: &Image) -> Image {
        match *self {
            Transform::Identity => image.clone(),
            Transform::Grayscale => match image.as_gray() {
                Some(_) => image.clone(),
                None => Image::from_gray(image.to_luma()),
            },
            Transform::Median { ksize } => match (image.as_gray(), image.as_rgb()) {
                (Some(gray), _) => Image::from_gray(median_blur_gray(gray, ksize)),
                (_, Some(rgb)) => Image::from_rgb(median_blur_rgb(rgb, ksize)),
                _ => image.clone(),
            },
            Transform::Otsu => Image::from_gray(otsu_binarize(&image.to_luma())),
            Transform::MorphClose { ksize } => morph_close(image, ksize),
        }
    }

    /// Reject parameter values the kernels cannot honor.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Transform::Median { ksize } | Transform::MorphClose { ksize }
                if ksize == 0 || ksize % 2 == 0 =>
            {
                Err(format!("{self} needs an odd, positive kernel size"))
            }
            Transform::MorphClose { ksize } if ksize > MAX_CLOSE_KSIZE => Err(format!(
                "{self} exceeds the largest closing kernel ({MAX_CLOSE_KSIZE})"
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Grayscale => write!(f, "grayscale"),
            Transform::Median { ksize } => write!(f, "median({ksize})"),
            Transform::Otsu => write!(f, "otsu"),
            Transform::MorphClose { ksize } => write!(f, "morph_close({ksize})"),
        }
    }
}

/// Run `transforms` left to right. An empty chain is the identity.
pub fn apply_chain(transforms: &[Transform], image: &Image) -> Image {
    transforms
        .iter()
        .fold(image.clone(), |current, transform| transform.apply(&current))
}

fn morph_close(image: &Image, ksize: u32) -> Image {
    let mask = Mask::square((ksize.min(MAX_CLOSE_KSIZE) / 2) as u8);
    match (image.as_gray(), image.as_rgb()) {
        (Some(gray), _) => Image::from_gray(grayscale_close(gray, &mask)),
        (_, Some(rgb)) => Image::from_rgb(close_rgb(rgb, &mask)),
        _ => image.clone(),
    }
}

/// Close each color plane on its own, then interleave them again.
fn close_rgb(rgb: &RgbImage, mask: &Mask) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let [r, g, b] = [0, 1, 2].map(|c| {
        let plane = GrayImage::from_fn(width, height, |x, y| Luma([rgb.get_pixel(x, y)[c]]));
        grayscale_close(&plane, mask)
    });
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([r.get_pixel(x, y)[0], g.get_pixel(x, y)[0], b.get_pixel(x, y)[0]])
    })
}
