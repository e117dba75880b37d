//! Camera sessions.
//!
//! A `CameraSession` owns one live frame source and releases it on every exit
//! path: explicitly through `release()` or implicitly on drop.

pub mod still;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::common::config::CameraConfig;
use crate::common::{FaceLinkError, Result};
use crate::core::crop::AspectCropper;
use crate::core::frame::Frame;

pub use still::{StillSource, SyntheticSource};

/// A live video source.
pub trait FrameSource: Send {
    /// Intrinsic stream dimensions, `(0, 0)` until frames are available.
    fn dimensions(&self) -> (u32, u32);

    /// The frame current at call time.
    fn current_frame(&mut self) -> Result<Frame>;

    /// Stop all tracks. Must be idempotent.
    fn release(&mut self);

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl FacingMode {
    pub fn toggled(self) -> Self {
        match self {
            FacingMode::User => FacingMode::Environment,
            FacingMode::Environment => FacingMode::User,
        }
    }
}

impl FromStr for FacingMode {
    type Err = FaceLinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(FacingMode::User),
            "environment" | "back" | "rear" => Ok(FacingMode::Environment),
            other => Err(FaceLinkError::Config(format!("unknown facing mode: {}", other))),
        }
    }
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::User => write!(f, "user"),
            FacingMode::Environment => write!(f, "environment"),
        }
    }
}

/// Exclusive handle on an open camera stream.
pub struct CameraSession {
    source: Option<Box<dyn FrameSource>>,
    facing: FacingMode,
}

impl CameraSession {
    /// Open the device configured for `facing` at the configured preferred resolution.
    pub fn open(config: &CameraConfig, facing: FacingMode) -> Result<Self> {
        let device = match facing {
            FacingMode::User => config.user_device.as_str(),
            FacingMode::Environment => config
                .environment_device
                .as_deref()
                .unwrap_or(config.user_device.as_str()),
        };
        let source = open_source(device, config)?;
        info!("Camera session opened ({}, {})", facing, source.describe());
        Ok(Self { source: Some(source), facing })
    }

    pub fn from_source(source: Box<dyn FrameSource>) -> Self {
        Self { source: Some(source), facing: FacingMode::User }
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the stream reports real dimensions yet.
    pub fn is_ready(&self) -> bool {
        match &self.source {
            Some(source) => {
                let (w, h) = source.dimensions();
                w > 0 && h > 0
            }
            None => false,
        }
    }

    pub fn sample(&mut self) -> Result<Frame> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| FaceLinkError::Camera("camera session already released".into()))?;
        source.current_frame()
    }

    /// Sample the current frame and cover-crop it into `cropper`'s target.
    pub fn sample_cropped(&mut self, cropper: &AspectCropper) -> Result<Frame> {
        let frame = self.sample()?;
        cropper.crop(&frame)
    }

    pub fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            debug!("Camera session released ({})", source.describe());
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_source(device: &str, config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    if let Some(name) = device.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticSource::new(name, config.width, config.height)));
    }

    let path = Path::new(device);
    if device.starts_with("/dev/") {
        return open_device(path, config);
    }
    if path.is_file() {
        return Ok(Box::new(StillSource::open(path)?));
    }

    Err(FaceLinkError::Camera(format!("no such camera source: {}", device)))
}

#[cfg(feature = "v4l2")]
fn open_device(path: &Path, config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(v4l2::V4l2Source::open(path, config)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_device(path: &Path, _config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    Err(FaceLinkError::Camera(format!(
        "{} requires the `v4l2` feature; rebuild with --features v4l2 or pass an image file",
        path.display()
    )))
}
