// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the fracture classifier

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;

use super::image_utils::{decode_image_bytes, ImageError};

/// Classifier input height and width
pub const CLASSIFIER_INPUT_SIZE: u32 = 256;

/// Number of color channels in the classifier input
pub const CLASSIFIER_CHANNELS: usize = 3;

/// Channel ordering the classifier was trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Source channel index for output channel `c`
    fn source_channel(self, c: usize) -> usize {
        match self {
            ChannelOrder::Rgb => c,
            ChannelOrder::Bgr => 2 - c,
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Rgb => write!(f, "rgb"),
            ChannelOrder::Bgr => write!(f, "bgr"),
        }
    }
}

impl FromStr for ChannelOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rgb" => Ok(ChannelOrder::Rgb),
            "bgr" => Ok(ChannelOrder::Bgr),
            other => Err(format!("unsupported channel order '{}', expected rgb or bgr", other)),
        }
    }
}

/// Preprocess a decoded image for classification
///
/// Steps:
/// 1. Convert to 8-bit color in the classifier's channel order
/// 2. Resize to exactly 256x256 with bilinear interpolation (aspect ratio is not kept)
/// 3. Scale pixel values from [0, 255] to [0.0, 1.0]
/// 4. Lay out as NHWC tensor [1, 256, 256, 3] of f32
pub fn preprocess_for_classification(image: &DynamicImage, order: ChannelOrder) -> Array4<f32> {
    let size = CLASSIFIER_INPUT_SIZE as usize;

    let rgb = image.to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        CLASSIFIER_INPUT_SIZE,
        CLASSIFIER_INPUT_SIZE,
        FilterType::Triangle,
    );

    let mut tensor = Array4::zeros((1, size, size, CLASSIFIER_CHANNELS));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..CLASSIFIER_CHANNELS {
            tensor[[0, y as usize, x as usize, c]] =
                pixel[order.source_channel(c)] as f32 / 255.0;
        }
    }

    tensor
}

/// Decode upload bytes and preprocess them for classification
pub fn preprocess_image_bytes(bytes: &[u8], order: ChannelOrder) -> Result<Array4<f32>, ImageError> {
    let (image, _info) = decode_image_bytes(bytes)?;
    Ok(preprocess_for_classification(&image, order))
}
