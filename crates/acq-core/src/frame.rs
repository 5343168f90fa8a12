//! Raw image frames and simple intensity statistics.

use serde::{Deserialize, Serialize};

/// A single 16-bit grayscale frame from the camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Row-major pixel data, `width * height` values.
    pub pixels: Vec<u16>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u16>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Intensity at the given percentile (0.0 to 100.0).
    ///
    /// Autoexposure uses a high percentile (99.9) rather than the raw maximum
    /// so that isolated hot pixels do not drive the exposure decision.
    /// Returns 0 for an empty frame.
    pub fn peak_intensity(&self, percentile: f64) -> u16 {
        if self.pixels.is_empty() {
            return 0;
        }
        let mut sorted = self.pixels.clone();
        sorted.sort_unstable();
        let pct = percentile.clamp(0.0, 100.0);
        let idx = ((sorted.len() - 1) as f64 * pct / 100.0).round() as usize;
        sorted[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_ignores_hot_pixels() {
        // 999 background pixels plus one hot pixel; the 99.9th percentile
        // lands on the hot pixel only when it is at least 0.1% of the frame.
        let mut pixels = vec![100u16; 2000];
        pixels[0] = 60000;
        let img = RawImage::new(50, 40, pixels);
        assert_eq!(img.peak_intensity(99.9), 100);
        assert_eq!(img.peak_intensity(100.0), 60000);
    }

    #[test]
    fn peak_of_empty_frame_is_zero() {
        let img = RawImage::new(0, 0, Vec::new());
        assert_eq!(img.peak_intensity(99.9), 0);
    }

    #[test]
    fn median_of_uniform_frame() {
        let img = RawImage::new(4, 4, vec![500; 16]);
        assert_eq!(img.peak_intensity(50.0), 500);
    }
}
