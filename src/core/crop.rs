//! Cover-crop of arbitrary source frames into fixed-size target buffers.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::common::{FaceLinkError, Result};
use crate::core::frame::Frame;

/// Source sub-rectangle selected for a crop, in source pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

/// Maps frames of any aspect ratio onto a `width` x `height` buffer, cropping
/// the longer source dimension around the center and never letterboxing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectCropper {
    pub width: u32,
    pub height: u32,
}

impl AspectCropper {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The maximal centered sub-rectangle of a `(source_width, source_height)`
    /// frame with the target aspect ratio.
    pub fn source_rect(&self, source_width: u32, source_height: u32) -> Result<CropRect> {
        if source_width == 0 || source_height == 0 {
            return Err(FaceLinkError::SourceNotReady);
        }
        if self.width == 0 || self.height == 0 {
            return Err(FaceLinkError::Config(format!(
                "crop target must be non-empty, got {}x{}", self.width, self.height
            )));
        }

        let sw = source_width as f64;
        let sh = source_height as f64;
        let tw = self.width as f64;
        let th = self.height as f64;

        if sw / sh > tw / th {
            let width = sh * tw / th;
            Ok(CropRect { x: (sw - width) / 2.0, y: 0.0, width, height: sh })
        } else {
            let height = sw * th / tw;
            Ok(CropRect { x: 0.0, y: (sh - height) / 2.0, width: sw, height })
        }
    }

    /// Crop and resample `frame` into the target size.
    pub fn crop(&self, frame: &Frame) -> Result<RgbaImage> {
        let (sw, sh) = frame.dimensions();
        let rect = self.source_rect(sw, sh)?;

        let (x, y, w, h) = pixel_bounds(&rect, sw, sh);
        if (x, y, w, h) == (0, 0, self.width, self.height) {
            return Ok(frame.clone());
        }

        let region = imageops::crop_imm(frame, x, y, w, h).to_image();
        if region.dimensions() == (self.width, self.height) {
            return Ok(region);
        }
        Ok(imageops::resize(&region, self.width, self.height, FilterType::Triangle))
    }
}

/// Snap a fractional rectangle to whole pixels inside the source.
fn pixel_bounds(rect: &CropRect, source_width: u32, source_height: u32) -> (u32, u32, u32, u32) {
    let x = (rect.x.round() as u32).min(source_width - 1);
    let y = (rect.y.round() as u32).min(source_height - 1);
    let w = (rect.width.round() as u32).clamp(1, source_width - x);
    let h = (rect.height.round() as u32).clamp(1, source_height - y);
    (x, y, w, h)
}
