// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Focus measure for uploaded X-rays
//!
//! The score is the variance of the 4-neighbour Laplacian response over the
//! grayscale image. Blurred images have smooth intensity gradients and so a
//! small second-derivative variance.

use image::{DynamicImage, GrayImage};

use super::image_utils::{decode_image_bytes, ImageError};

/// Reflect-101 index into `0..len` (`gfedcb|abcdefgh|gfedcba`)
///
/// `len == 1` always maps to 0.
fn reflect_101(index: i64, len: i64) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as u32
}

/// Variance of the Laplacian response of a grayscale image
///
/// Applies the kernel
/// ```text
/// [ 0  1  0 ]
/// [ 1 -4  1 ]
/// [ 0  1  0 ]
/// ```
/// at every pixel, reflecting across the border without repeating the edge
/// pixel, and returns the population variance of the responses. A uniform
/// image scores 0.0.
pub fn laplacian_variance(img: &GrayImage) -> f64 {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let (w, h) = (width as i64, height as i64);
    let px = |x: i64, y: i64| -> f64 {
        img.get_pixel(reflect_101(x, w), reflect_101(y, h))[0] as f64
    };

    // Single pass with Welford's update keeps the variance numerically stable
    // on large radiographs.
    let mut count = 0u64;
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;

    for y in 0..h {
        for x in 0..w {
            let response =
                px(x, y - 1) + px(x, y + 1) + px(x - 1, y) + px(x + 1, y) - 4.0 * px(x, y);

            count += 1;
            let delta = response - mean;
            mean += delta / count as f64;
            m2 += delta * (response - mean);
        }
    }

    (m2 / count as f64).max(0.0)
}

/// Sharpness score of a decoded image (grayscale-converted first)
pub fn sharpness_score(img: &DynamicImage) -> f64 {
    laplacian_variance(&img.to_luma8())
}

/// Decode raw upload bytes and score them
///
/// Undecodable input is reported as an `ImageError`.
pub fn score_image_bytes(bytes: &[u8]) -> Result<f64, ImageError> {
    let (img, _info) = decode_image_bytes(bytes)?;
    Ok(sharpness_score(&img))
}
