//! Frame sources that do not need camera hardware.

use std::path::Path;

use image::{Rgba, RgbaImage};
use tracing::info;

use super::FrameSource;
use crate::common::{FaceLinkError, Result};
use crate::core::frame::Frame;

/// Serves one decoded image as the live frame.
pub struct StillSource {
    frame: Option<RgbaImage>,
    label: String,
}

impl StillSource {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .map_err(|e| FaceLinkError::Camera(format!("Failed to open {}: {}", path.display(), e)))?;
        info!("Still source loaded {} ({}x{})", path.display(), image.width(), image.height());
        Ok(Self { frame: Some(image.to_rgba8()), label: path.display().to_string() })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { frame: Some(image), label: "memory".to_string() }
    }
}

impl FrameSource for StillSource {
    fn dimensions(&self) -> (u32, u32) {
        self.frame.as_ref().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn current_frame(&mut self) -> Result<Frame> {
        Ok(self.frame.clone().unwrap_or_default())
    }

    fn release(&mut self) {
        self.frame = None;
    }

    fn describe(&self) -> String {
        format!("still:{}", self.label)
    }
}

/// Synthetic moving pattern for `stub://` devices.
pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    released: bool,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self { name: name.to_string(), width, height, frame_count: 0, released: false }
    }
}

impl FrameSource for SyntheticSource {
    fn dimensions(&self) -> (u32, u32) {
        if self.released { (0, 0) } else { (self.width, self.height) }
    }

    fn current_frame(&mut self) -> Result<Frame> {
        if self.released {
            return Ok(Frame::default());
        }
        self.frame_count += 1;
        let shift = (self.frame_count * 8 % 256) as u32;
        let (w, h) = (self.width.max(1), self.height.max(1));
        Ok(RgbaImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x * 255 / w + shift) % 256) as u8;
            let g = (y * 255 / h) as u8;
            Rgba([r, g, 128, 255])
        }))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }
}
