use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, warn};

use crate::core::frame::EncodedImage;

pub const BIN_COUNT: usize = 20;
/// Images are resampled to this square size before counting.
pub const SAMPLE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBin {
    pub bin: usize,
    /// Normalized magnitude in `[0, 100]`; the fullest bin is exactly 100.
    pub value: f64,
}

/// Raw per-bin pixel counts of mean channel luminance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LuminanceCounts {
    pub counts: [u32; BIN_COUNT],
}

impl LuminanceCounts {
    pub fn from_image(image: &RgbaImage) -> Self {
        let mut counts = [0u32; BIN_COUNT];
        for pixel in image.pixels() {
            let mean = (pixel[0] as f64 + pixel[1] as f64 + pixel[2] as f64) / 3.0;
            let index = (mean / 255.0 * (BIN_COUNT - 1) as f64).floor() as usize;
            counts[index.min(BIN_COUNT - 1)] += 1;
        }
        Self { counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    pub fn normalized(&self) -> Vec<HistogramBin> {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .enumerate()
            .map(|(bin, &count)| HistogramBin {
                bin,
                value: count as f64 / max as f64 * 100.0,
            })
            .collect()
    }
}

/// Histogram of an image already in memory, after resampling to `SAMPLE_SIZE`.
pub fn histogram_of(image: &RgbaImage) -> Vec<HistogramBin> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }
    let sampled = imageops::resize(image, SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle);
    LuminanceCounts::from_image(&sampled).normalized()
}

/// Decode and bin an encoded image. Undecodable input yields an empty histogram.
pub fn histogram_blocking(image: &EncodedImage) -> Vec<HistogramBin> {
    match image.decode() {
        Ok(decoded) => histogram_of(&decoded),
        Err(e) => {
            debug!("Histogram skipped: {}", e);
            Vec::new()
        }
    }
}

/// Async wrapper that keeps decoding off the runtime threads. Safe to call
/// repeatedly; each call works on its own copy of the image.
pub async fn extract(image: &EncodedImage) -> Vec<HistogramBin> {
    let image = image.clone();
    match tokio::task::spawn_blocking(move || histogram_blocking(&image)).await {
        Ok(bins) => bins,
        Err(e) => {
            warn!("Histogram worker failed: {}", e);
            Vec::new()
        }
    }
}
