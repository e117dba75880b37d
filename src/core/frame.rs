use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::{FaceLinkError, Result};

/// Pixel data sampled from a video source. A zero-sized frame means the
/// source has not started streaming.
pub type Frame = RgbaImage;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A lossy-encoded still image carried as a base64 JPEG data URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    /// Encode RGBA pixels as JPEG at `quality` (1-100). Alpha is dropped.
    pub fn encode(image: &RgbaImage, quality: u8) -> Result<Self> {
        let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100))
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;

        Ok(Self(format!("{}{}", DATA_URL_PREFIX, STANDARD.encode(&bytes))))
    }

    /// Wrap an already-encoded string as received from the service.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }

    /// Raw image bytes. Accepts both data URLs and bare base64.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(self.payload().trim())
            .map_err(|e| FaceLinkError::Decode(format!("invalid base64 payload: {}", e)))
    }

    pub fn decode(&self) -> Result<RgbaImage> {
        let bytes = self.to_bytes()?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| FaceLinkError::Decode(format!("undecodable image: {}", e)))?;
        Ok(image.to_rgba8())
    }

    fn payload(&self) -> &str {
        match self.0.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => &self.0,
        }
    }
}

// Payloads are kilobytes of base64; keep logs readable.
impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncodedImage({} bytes)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn encodes_as_jpeg_data_url() {
        let img = RgbaImage::from_pixel(8, 6, Rgba([200, 10, 10, 255]));
        let encoded = EncodedImage::encode(&img, 90).unwrap();
        assert!(encoded.as_str().starts_with(DATA_URL_PREFIX));

        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[test]
    fn accepts_bare_base64() {
        let img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let encoded = EncodedImage::encode(&img, 80).unwrap();
        let bare = EncodedImage::from_string(encoded.as_str().trim_start_matches(DATA_URL_PREFIX));
        assert_eq!(bare.decode().unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn garbage_fails_to_decode() {
        let bogus = EncodedImage::from_string("data:image/jpeg;base64,bm90IGFuIGltYWdl");
        assert!(matches!(bogus.decode(), Err(FaceLinkError::Decode(_))));
        assert!(EncodedImage::from_string("").is_empty());
    }
}
