//! Capture quality metrics for a photographed or scanned sheet.
//!
//! All scores are on a 0..100 scale where higher is better. They are
//! informational: a low score does not stop a sheet from being read, but it
//! lets the caller decide whether to ask for a re-capture.

use crate::GrayImageView;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Moderate,
    Poor,
    VeryPoor,
}

impl QualityLevel {
    pub fn from_score(overall: f32) -> Self {
        match overall {
            s if s >= 80.0 => Self::Excellent,
            s if s >= 70.0 => Self::Good,
            s if s >= 60.0 => Self::Moderate,
            s if s >= 40.0 => Self::Poor,
            _ => Self::VeryPoor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhotoQuality {
    /// Laplacian variance, scaled.
    pub sharpness: f32,
    /// Intensity standard deviation, scaled.
    pub contrast: f32,
    /// Mid-gray proximity minus a penalty for clipped pixels.
    pub lighting: f32,
    /// Inverse of the mean deviation from a 3x3 box blur.
    pub noise: f32,
    pub overall: f32,
    pub level: QualityLevel,
}

const W_SHARPNESS: f32 = 0.3;
const W_CONTRAST: f32 = 0.3;
const W_LIGHTING: f32 = 0.2;
const W_NOISE: f32 = 0.2;

/// Assess sharpness, contrast, lighting and noise of a grayscale capture.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img), fields(width = img.width, height = img.height))
)]
pub fn assess_quality(img: &GrayImageView<'_>) -> PhotoQuality {
    let n = (img.width * img.height).max(1) as f64;

    let mean = img.data.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = img
        .data
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let contrast = (var.sqrt() * 2.0).min(100.0) as f32;

    let over = img.data.iter().filter(|&&v| v > 240).count() as f64 / n * 100.0;
    let under = img.data.iter().filter(|&&v| v < 15).count() as f64 / n * 100.0;
    let brightness = (100.0 - (mean - 128.0).abs() * 2.0).max(0.0);
    let lighting = (brightness - (over + under) * 2.0).max(0.0) as f32;

    let (lap_var, noise_level) = interior_stats(img);
    let sharpness = (lap_var / 10.0).min(100.0) as f32;
    let noise = (100.0 - noise_level * 4.0).max(0.0) as f32;

    let overall = sharpness * W_SHARPNESS
        + contrast * W_CONTRAST
        + lighting * W_LIGHTING
        + noise * W_NOISE;

    PhotoQuality {
        sharpness,
        contrast,
        lighting,
        noise,
        overall,
        level: QualityLevel::from_score(overall),
    }
}

// Laplacian variance and mean |pixel - box3x3| over interior pixels.
fn interior_stats(img: &GrayImageView<'_>) -> (f64, f64) {
    if img.width < 3 || img.height < 3 {
        return (0.0, 0.0);
    }
    let mut lap_sum = 0.0;
    let mut lap_sq = 0.0;
    let mut dev_sum = 0.0;
    let mut count = 0.0;
    for y in 1..img.height - 1 {
        for x in 1..img.width - 1 {
            let c = img.get(x, y) as f64;
            let n4 = img.get(x - 1, y) as f64
                + img.get(x + 1, y) as f64
                + img.get(x, y - 1) as f64
                + img.get(x, y + 1) as f64;
            let lap = n4 - 4.0 * c;
            lap_sum += lap;
            lap_sq += lap * lap;

            let mut box_sum = 0.0;
            for dy in 0..3 {
                for dx in 0..3 {
                    box_sum += img.get(x + dx - 1, y + dy - 1) as f64;
                }
            }
            dev_sum += (c - box_sum / 9.0).abs();
            count += 1.0;
        }
    }
    let lap_mean = lap_sum / count;
    ((lap_sq / count - lap_mean * lap_mean).max(0.0), dev_sum / count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::GrayImage;

    #[test]
    fn flat_gray_is_dull_but_clean() {
        let img = GrayImage::filled(32, 32, 128);
        let q = assess_quality(&img.view());
        assert_eq!(q.sharpness, 0.0);
        assert_eq!(q.contrast, 0.0);
        assert_abs_diff_eq!(q.lighting, 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(q.noise, 100.0, epsilon = 1e-4);
        assert_eq!(q.level, QualityLevel::Poor);
    }

    #[test]
    fn crisp_checker_scores_sharp_and_contrasty() {
        let data = (0..64 * 64)
            .map(|i| {
                let (x, y) = (i % 64, i / 64);
                if ((x / 8) + (y / 8)) % 2 == 0 {
                    40
                } else {
                    215
                }
            })
            .collect();
        let img = GrayImage::from_raw(64, 64, data).expect("image");
        let q = assess_quality(&img.view());
        assert!(q.sharpness > 90.0, "{q:?}");
        assert!(q.contrast > 90.0, "{q:?}");
        assert!(q.overall > 60.0, "{q:?}");
    }
}
