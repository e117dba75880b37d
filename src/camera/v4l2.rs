use std::io::ErrorKind;
use std::path::Path;

use image::{ImageBuffer, ImageFormat, Luma, Rgb, RgbaImage, DynamicImage};
use ouroboros::self_referencing;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::FrameSource;
use crate::common::config::CameraConfig;
use crate::common::{FaceLinkError, Result};
use crate::core::frame::Frame;

#[self_referencing]
struct StreamState {
    device: Device,
    #[borrows(device)]
    #[covariant]
    stream: v4l::io::mmap::Stream<'this>,
}

/// Frames from a local V4L2 device, decoded to RGBA.
pub struct V4l2Source {
    path: String,
    state: Option<StreamState>,
    width: u32,
    height: u32,
    fourcc: [u8; 4],
    frames_captured: u64,
}

impl V4l2Source {
    pub fn open(path: &Path, config: &CameraConfig) -> Result<Self> {
        let path_str = path.display().to_string();
        info!("Opening camera device {}...", path_str);

        let device = Device::with_path(path).map_err(|e| {
            if e.kind() == ErrorKind::PermissionDenied {
                FaceLinkError::PermissionDenied(format!("{}: {}", path_str, e))
            } else {
                FaceLinkError::Camera(format!("Failed to open camera {}: {}", path_str, e))
            }
        })?;

        let caps = device.query_caps()
            .map_err(|e| FaceLinkError::Camera(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            warn!("Device {} ({}) may not support standard video capture", path_str, caps.card);
        }

        let mut fmt = device.format()
            .map_err(|e| FaceLinkError::Camera(format!("Failed to get format: {}", e)))?;
        fmt.width = config.width;
        fmt.height = config.height;
        // Keep GREY for IR sensors, otherwise ask for MJPG
        if &fmt.fourcc.repr != b"GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            warn!("Could not set exact format on {}: {}. Using device defaults.", path_str, e);
        }

        let actual = device.format()
            .map_err(|e| FaceLinkError::Camera(format!("Failed to get final format: {}", e)))?;
        if actual.width != config.width || actual.height != config.height {
            info!(
                "Camera resolution {}x{} differs from preferred {}x{}",
                actual.width, actual.height, config.width, config.height
            );
        }

        let state = StreamStateTryBuilder {
            device,
            stream_builder: |device: &Device| {
                v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|e| FaceLinkError::Camera(format!("Failed to create stream: {}", e)))
            },
        }
        .try_build()?;

        let mut source = Self {
            path: path_str,
            state: Some(state),
            width: actual.width,
            height: actual.height,
            fourcc: actual.fourcc.repr,
            frames_captured: 0,
        };

        for i in 0..config.warmup_frames {
            source.next_buffer().map_err(|e| {
                FaceLinkError::Camera(format!("Failed to capture warmup frame {}: {}", i, e))
            })?;
        }
        debug!("Camera {} ready after {} warmup frames", source.path, config.warmup_frames);

        Ok(source)
    }

    fn next_buffer(&mut self) -> Result<Vec<u8>> {
        let state = self.state.as_mut()
            .ok_or_else(|| FaceLinkError::Camera("stream released".into()))?;
        let data = state
            .with_stream_mut(|stream| stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|e| FaceLinkError::Camera(format!("Failed to capture: {}", e)))?;
        self.frames_captured += 1;
        Ok(data)
    }

    fn decode(&self, data: &[u8]) -> Result<Frame> {
        let (w, h) = (self.width, self.height);
        match &self.fourcc {
            b"MJPG" => {
                let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
                Ok(image.to_rgba8())
            }
            b"GREY" => {
                let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(w, h, data.to_vec())
                    .ok_or_else(|| FaceLinkError::Camera("Failed to create grayscale image buffer".into()))?;
                Ok(DynamicImage::ImageLuma8(buffer).to_rgba8())
            }
            b"RGB3" => {
                let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, data.to_vec())
                    .ok_or_else(|| FaceLinkError::Camera("Failed to create RGB image buffer".into()))?;
                Ok(DynamicImage::ImageRgb8(buffer).to_rgba8())
            }
            b"YUYV" => yuyv_to_rgba(data, w, h),
            other => Err(FaceLinkError::Camera(format!(
                "Unsupported pixel format {}", String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl FrameSource for V4l2Source {
    fn dimensions(&self) -> (u32, u32) {
        if self.state.is_some() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn current_frame(&mut self) -> Result<Frame> {
        let data = self.next_buffer()?;
        self.decode(&data)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            info!("Camera {} stopped after {} frames", self.path, self.frames_captured);
        }
    }

    fn describe(&self) -> String {
        format!("{} {}x{} {}", self.path, self.width, self.height, String::from_utf8_lossy(&self.fourcc))
    }
}

/// Packed YUYV 4:2:2 to RGBA, BT.601 coefficients.
fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let expected = width as usize * height as usize * 2;
    if data.len() < expected {
        return Err(FaceLinkError::Camera(format!(
            "YUYV data size mismatch: expected {}, got {}", expected, data.len()
        )));
    }

    let mut rgba = RgbaImage::new(width, height);
    for (i, chunk) in data[..expected].chunks_exact(4).enumerate() {
        let pixel = (i * 2) as u32;
        let (x, y) = (pixel % width, pixel / width);
        let (y1, u, y2, v) = (chunk[0] as f32, chunk[1] as f32, chunk[2] as f32, chunk[3] as f32);
        rgba.put_pixel(x, y, yuv_to_rgba(y1, u, v));
        if x + 1 < width {
            rgba.put_pixel(x + 1, y, yuv_to_rgba(y2, u, v));
        }
    }
    Ok(rgba)
}

fn yuv_to_rgba(y: f32, u: f32, v: f32) -> image::Rgba<u8> {
    let c = y - 16.0;
    let d = u - 128.0;
    let e = v - 128.0;
    let r = (1.164 * c + 1.596 * e).clamp(0.0, 255.0) as u8;
    let g = (1.164 * c - 0.392 * d - 0.813 * e).clamp(0.0, 255.0) as u8;
    let b = (1.164 * c + 2.017 * d).clamp(0.0, 255.0) as u8;
    image::Rgba([r, g, b, 255])
}
