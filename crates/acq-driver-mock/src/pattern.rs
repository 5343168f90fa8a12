//! Synthetic nucleus-field images for the mock camera.
//!
//! Frames imitate a sparsely confluent DAPI field: dim noisy background
//! with a handful of bright, flat-topped nuclei. The 99.9th-percentile
//! peak of an unscaled frame sits near 620 counts, which the exposure
//! model in [`ExposureState`] multiplies into the ranges the autoexposure
//! loop is expected to react to.

use serde::{Deserialize, Serialize};

/// Simple pseudo-random number generator (LCG) for reproducible noise.
/// Uses the same algorithm as glibc for predictable cross-platform behavior.
#[inline]
fn prng(seed: u64) -> u64 {
    seed.wrapping_mul(1103515245).wrapping_add(12345) & 0x7fff_ffff
}

/// How the simulated sample responds to the signal channel, expressed as a
/// multiplier on the base nucleus field before exposure scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureState {
    /// Too dim to reach the target window even at maximum exposure.
    WayUnder,
    /// Dim; a few exposure increases reach the window.
    Under,
    /// In the target window at default settings.
    InBand,
    /// Bright; reducing exposure (and then power) reaches the window.
    Over,
    /// Saturated; stays clipped all the way down to minimum power.
    WayOver,
}

impl ExposureState {
    pub fn factor(self) -> f64 {
        match self {
            ExposureState::WayUnder => 1.0,
            ExposureState::Under => 10.0,
            ExposureState::InBand => 25.0,
            ExposureState::Over => 100.0,
            ExposureState::WayOver => 100_000.0,
        }
    }
}

impl Default for ExposureState {
    fn default() -> Self {
        ExposureState::InBand
    }
}

/// Generate a synthetic nucleus field.
///
/// Background is noise around 150 counts; nuclei are flat disks around
/// 600 counts covering well over 0.1% of the frame, so the engine's
/// 99.9th-percentile peak always lands on nucleus pixels.
pub fn generate_nucleus_field(width: u32, height: u32, seed: u64) -> Vec<u16> {
    let w = width as usize;
    let h = height as usize;
    let mut buffer = vec![0u16; w * h];

    for (idx, px) in buffer.iter_mut().enumerate() {
        let noise = prng(seed ^ (idx as u64));
        *px = 100 + (noise % 101) as u16; // background 100..=200
    }

    // At least 4 nuclei, more on larger frames, radius capped for tiny frames.
    let num_nuclei = ((w * h) / 4096).max(4);
    let radius = (w.min(h) / 6).min(8).max(1) as i64;
    let mut pos_seed = prng(seed.wrapping_add(0xA5A5));
    for n in 0..num_nuclei {
        pos_seed = prng(pos_seed.wrapping_add(n as u64));
        let cx = (pos_seed as usize) % w;
        pos_seed = prng(pos_seed);
        let cy = (pos_seed as usize) % h;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let x = cx as i64 + dx;
                let y = cy as i64 + dy;
                if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                    continue;
                }
                let idx = y as usize * w + x as usize;
                let noise = prng(seed ^ (idx as u64).wrapping_mul(31));
                buffer[idx] = 600 + (noise % 21) as u16; // nucleus 600..=620
            }
        }
    }

    buffer
}

/// Scale pixel values by a factor, clipping to the u16 range.
pub fn scale_clip(pixels: &[u16], factor: f64) -> Vec<u16> {
    pixels
        .iter()
        .map(|&p| (f64::from(p) * factor).clamp(0.0, f64::from(u16::MAX)) as u16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percentile(pixels: &[u16], pct: f64) -> u16 {
        let mut sorted = pixels.to_vec();
        sorted.sort_unstable();
        sorted[((sorted.len() - 1) as f64 * pct / 100.0).round() as usize]
    }

    #[test]
    fn field_is_deterministic_for_seed() {
        let a = generate_nucleus_field(64, 64, 7);
        let b = generate_nucleus_field(64, 64, 7);
        assert_eq!(a, b);
        let c = generate_nucleus_field(64, 64, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn peak_lands_on_nucleus_pixels() {
        let field = generate_nucleus_field(64, 64, 1);
        let peak = percentile(&field, 99.9);
        assert!((600..=620).contains(&peak), "peak was {}", peak);
    }

    #[test]
    fn scaling_clips_at_u16_max() {
        let scaled = scale_clip(&[100, 600, 65000], 100_000.0);
        assert_eq!(scaled, vec![u16::MAX, u16::MAX, u16::MAX]);
    }

    #[test]
    fn in_band_factor_hits_target_window() {
        let field = generate_nucleus_field(64, 64, 3);
        let scaled = scale_clip(&field, ExposureState::InBand.factor());
        let peak = percentile(&scaled, 99.9);
        assert!((8192..=32768).contains(&peak), "peak was {}", peak);
    }
}
