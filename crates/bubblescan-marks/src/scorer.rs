//! Fill measurement for one option region.

use bubblescan_core::{otsu_threshold, GrayImageView};
use bubblescan_layout::{QuestionRegions, Region};
use serde::{Deserialize, Serialize};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RegionError {
    #[error("question {question} option {label}: region leaves the image")]
    OutOfBounds { question: u32, label: String },
    #[error("question {question} option {label}: region covers no pixels")]
    Empty { question: u32, label: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringParams {
    /// Half-size of the thresholding window, in region radii.
    pub window_factor: f32,
    /// Core disk radius, in region radii.
    pub core_factor: f32,
    /// Below this window intensity range the local threshold is not trusted
    /// and `fallback_ink_level` is used instead.
    pub min_window_contrast: u8,
    /// Absolute ink threshold for low-contrast windows.
    pub fallback_ink_level: u8,
    pub core_weight: f32,
    pub darkness_weight: f32,
    pub coverage_weight: f32,
    /// Core fill (percent) under which the combined score is penalized.
    pub core_floor: f32,
    /// Multiplier applied to the combined score below `core_floor`.
    pub floor_penalty: f32,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            window_factor: 1.3,
            core_factor: 0.75,
            min_window_contrast: 40,
            fallback_ink_level: 128,
            core_weight: 0.5,
            darkness_weight: 0.25,
            coverage_weight: 0.25,
            core_floor: 20.0,
            floor_penalty: 0.3,
        }
    }
}

/// Fill measurements of one region. All values are percentages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionScore {
    pub label: String,
    /// Mean inverted brightness over the full disk.
    pub darkness: f32,
    /// Share of full-disk pixels at or below the local threshold.
    pub coverage: f32,
    /// Coverage of the core disk only.
    pub core_fill: f32,
    /// Weighted combination, dominated by core fill.
    pub score: f32,
}

/// Scores of the reachable options of one question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionScores {
    pub question: u32,
    /// Scores in template option order.
    pub scores: Vec<RegionScore>,
    /// Options that could not be scored.
    pub unreachable: Vec<String>,
}

impl QuestionScores {
    pub fn expected(&self) -> usize {
        self.scores.len() + self.unreachable.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MarkScorer {
    params: ScoringParams,
}

impl MarkScorer {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Score one region. Pure in the pixel data: same image and region, same score.
    pub fn score(
        &self,
        image: &GrayImageView<'_>,
        region: &Region,
    ) -> Result<RegionScore, RegionError> {
        if !region.inside(image.width, image.height) {
            return Err(RegionError::OutOfBounds {
                question: region.question,
                label: region.label.clone(),
            });
        }
        let p = &self.params;
        let (cx, cy, r) = (region.center.x, region.center.y, region.radius);

        let half = (r * p.window_factor).ceil();
        let x0 = (cx - half).floor().max(0.0) as usize;
        let y0 = (cy - half).floor().max(0.0) as usize;
        let x1 = ((cx + half).ceil() as usize).min(image.width);
        let y1 = ((cy + half).ceil() as usize).min(image.height);

        let mut window = Vec::with_capacity((x1 - x0) * (y1 - y0));
        for y in y0..y1 {
            window.extend_from_slice(&image.data[y * image.width + x0..y * image.width + x1]);
        }
        let (lo, hi) = window
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let ink_level = if hi.saturating_sub(lo) >= p.min_window_contrast {
            otsu_threshold(&window)
        } else {
            p.fallback_ink_level
        };

        let r2 = r * r;
        let core_r2 = (r * p.core_factor).powi(2);
        let mut disk = 0u32;
        let mut disk_ink = 0u32;
        let mut core = 0u32;
        let mut core_ink = 0u32;
        let mut inverted_sum = 0u64;
        for y in y0..y1 {
            let dy = y as f32 + 0.5 - cy;
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let d2 = dx * dx + dy * dy;
                if d2 > r2 {
                    continue;
                }
                let v = image.get(x, y);
                let ink = v <= ink_level;
                disk += 1;
                disk_ink += u32::from(ink);
                inverted_sum += (255 - v) as u64;
                if d2 <= core_r2 {
                    core += 1;
                    core_ink += u32::from(ink);
                }
            }
        }
        if disk == 0 || core == 0 {
            return Err(RegionError::Empty {
                question: region.question,
                label: region.label.clone(),
            });
        }

        let darkness = inverted_sum as f32 / disk as f32 / 255.0 * 100.0;
        let coverage = disk_ink as f32 / disk as f32 * 100.0;
        let core_fill = core_ink as f32 / core as f32 * 100.0;
        let mut score = p.core_weight * core_fill
            + p.darkness_weight * darkness
            + p.coverage_weight * coverage;
        if core_fill < p.core_floor {
            score *= p.floor_penalty;
        }

        Ok(RegionScore {
            label: region.label.clone(),
            darkness,
            coverage,
            core_fill,
            score,
        })
    }

    /// Score every option of a question; unscorable options are set aside.
    pub fn score_question(&self, image: &GrayImageView<'_>, q: &QuestionRegions) -> QuestionScores {
        let mut scores = Vec::with_capacity(q.regions.len());
        let mut unreachable = Vec::new();
        for region in &q.regions {
            match self.score(image, region) {
                Ok(s) => scores.push(s),
                Err(e) => {
                    log::debug!("{e}");
                    unreachable.push(region.label.clone());
                }
            }
        }
        QuestionScores {
            question: q.question,
            scores,
            unreachable,
        }
    }

    /// Score all questions of a sheet, in parallel with the `rayon` feature.
    pub fn score_sheet(
        &self,
        image: &GrayImageView<'_>,
        questions: &[QuestionRegions],
    ) -> Vec<QuestionScores> {
        #[cfg(feature = "rayon")]
        {
            questions
                .par_iter()
                .map(|q| self.score_question(image, q))
                .collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            questions
                .iter()
                .map(|q| self.score_question(image, q))
                .collect()
        }
    }
}
