//! Two-tone texture preview.
//!
//! Each pixel is binarized against a global threshold on its unweighted
//! channel mean. There is no neighborhood sampling: this is a preview of what
//! a texture descriptor looks like, not the descriptor the service computes.

use image::{Rgba, RgbaImage};
use imageproc::map::map_colors;

use crate::common::Result;
use crate::core::crop::AspectCropper;
use crate::core::frame::{EncodedImage, Frame};

pub const THRESHOLD: u16 = 100;
pub const HIGH: u8 = 180;
pub const LOW: u8 = 30;
pub const PREVIEW_QUALITY: u8 = 80;

/// Binarize an already-cropped buffer. Alpha is carried through unchanged.
pub fn apply(image: &RgbaImage) -> RgbaImage {
    map_colors(image, |pixel: Rgba<u8>| {
        let [r, g, b, a] = pixel.0;
        // mean > T  <=>  sum > 3T, without leaving integers
        let sum = r as u16 + g as u16 + b as u16;
        let tone = if sum > THRESHOLD * 3 { HIGH } else { LOW };
        Rgba([tone, tone, tone, a])
    })
}

/// Filter an already-cropped buffer and encode the preview.
pub fn visualize(cropped: &RgbaImage, quality: u8) -> Result<EncodedImage> {
    EncodedImage::encode(&apply(cropped), quality)
}

/// Cover-crop `frame` into `cropper`'s target, filter it and encode the preview.
pub fn visualize_frame(frame: &Frame, cropper: &AspectCropper) -> Result<EncodedImage> {
    visualize(&cropper.crop(frame)?, PREVIEW_QUALITY)
}
