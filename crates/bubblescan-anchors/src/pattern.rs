//! Anchors inferred from the printed option grid itself.
//!
//! Used when neither fiducials nor labels are found: printed option circles
//! (empty rings or filled marks) are located as roughly round blobs of the
//! expected size, grouped into rows, and the outermost candidates become the
//! corners of the template's option extent.

use crate::{Anchor, AnchorError, AnchorRole, CornerAnchors};
use bubblescan_core::{adaptive_threshold_mean, label_components, GrayImageView};
use bubblescan_layout::LayoutTemplate;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
    /// Adaptive threshold half-window, in expected option radii.
    pub threshold_radius_factor: f32,
    /// Ink must be this much darker than the local mean.
    pub threshold_offset: f32,
    /// Accepted bounding-box side range, relative to the expected diameter.
    pub min_size_ratio: f32,
    pub max_size_ratio: f32,
    pub min_squareness: f32,
    /// Solid squares (e.g. corner fiducials) fill their box almost entirely;
    /// rings and filled discs do not.
    pub max_fill_ratio: f32,
    /// Row grouping tolerance, in expected option radii.
    pub row_tolerance_factor: f32,
    pub min_per_row: usize,
    pub min_rows: usize,
    /// Fraction of template options that must be seen as candidates.
    pub min_coverage: f32,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            threshold_radius_factor: 3.0,
            threshold_offset: 20.0,
            min_size_ratio: 0.6,
            max_size_ratio: 1.6,
            min_squareness: 0.7,
            max_fill_ratio: 0.9,
            row_tolerance_factor: 1.0,
            min_per_row: 3,
            min_rows: 2,
            min_coverage: 0.5,
        }
    }
}

/// Candidate option centers grouped into rows, top to bottom.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionRows {
    pub rows: Vec<Vec<Point2<f32>>>,
}

impl OptionRows {
    pub fn candidate_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PatternDetector {
    params: PatternParams,
}

impl PatternDetector {
    pub fn new(params: PatternParams) -> Self {
        Self { params }
    }

    /// Corners of the option grid in the image, matching
    /// [`LayoutTemplate::option_extent_mm`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width, height = image.height))
    )]
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        template: &LayoutTemplate,
    ) -> Result<CornerAnchors, AnchorError> {
        let rows = self.option_rows(image, template);
        let found = rows.candidate_count();
        let required = ((self.params.min_coverage * template.option_count() as f32).ceil() as usize)
            .max(self.params.min_per_row * self.params.min_rows);
        log::debug!("pattern: {found} candidates in {} rows", rows.rows.len());
        if found < required || rows.rows.len() < self.params.min_rows {
            return Err(AnchorError::PatternTooSparse { found, required });
        }

        let quality = (found as f32 / template.option_count().max(1) as f32).min(1.0);
        let all = || rows.rows.iter().flatten();
        let pick = |key: fn(&Point2<f32>) -> f32, role| {
            let p = all()
                .copied()
                .max_by(|a, b| key(a).total_cmp(&key(b)))
                .unwrap_or_else(Point2::origin);
            Anchor {
                role,
                position: p,
                quality,
            }
        };
        Ok(CornerAnchors {
            top_left: pick(|p| -(p.x + p.y), AnchorRole::TopLeft),
            top_right: pick(|p| p.x - p.y, AnchorRole::TopRight),
            bottom_left: pick(|p| p.y - p.x, AnchorRole::BottomLeft),
            bottom_right: pick(|p| p.x + p.y, AnchorRole::BottomRight),
        })
    }

    /// Option-sized blobs grouped into rows with at least `min_per_row` members.
    pub fn option_rows(&self, image: &GrayImageView<'_>, template: &LayoutTemplate) -> OptionRows {
        let p = &self.params;
        let page = template.page();
        let px_per_mm = (image.width as f32 / page.width_mm).min(image.height as f32 / page.height_mm);
        let radius = template.option_radius_mm() * px_per_mm;
        let diameter = 2.0 * radius;

        let window = (radius * p.threshold_radius_factor).round().max(2.0) as usize;
        let mask = adaptive_threshold_mean(image, window, p.threshold_offset);
        let mut centers: Vec<Point2<f32>> = label_components(&mask, image.width, image.height, None)
            .iter()
            .filter(|c| {
                let w = c.width() as f32 / diameter;
                let h = c.height() as f32 / diameter;
                (p.min_size_ratio..=p.max_size_ratio).contains(&w)
                    && (p.min_size_ratio..=p.max_size_ratio).contains(&h)
                    && c.squareness() >= p.min_squareness
                    && c.fill_ratio() <= p.max_fill_ratio
            })
            .map(|c| c.bbox_center())
            .collect();
        centers.sort_by(|a, b| a.y.total_cmp(&b.y));

        let tol = radius * p.row_tolerance_factor;
        let mut rows: Vec<Vec<Point2<f32>>> = Vec::new();
        let mut current: Vec<Point2<f32>> = Vec::new();
        let mut row_y = 0.0;
        for c in centers {
            if !current.is_empty() && (c.y - row_y).abs() > tol {
                rows.push(std::mem::take(&mut current));
            }
            current.push(c);
            row_y = current.iter().map(|q| q.y).sum::<f32>() / current.len() as f32;
        }
        if !current.is_empty() {
            rows.push(current);
        }
        rows.retain(|r| r.len() >= p.min_per_row);
        for r in &mut rows {
            r.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        OptionRows { rows }
    }
}
