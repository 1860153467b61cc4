//! Square corner-marker detection.
//!
//! Each page corner gets its own search window. Inside a window the image is
//! binarized with a local Otsu threshold, dark connected components are
//! filtered by shape, size and tone, and the best-scoring survivor is taken
//! as that corner's fiducial if its score clears `min_score`.

use crate::{Anchor, AnchorError, AnchorRole, CornerAnchors};
use bubblescan_core::{label_components, otsu_threshold, threshold_mask, ComponentStats, GrayImageView};
use bubblescan_layout::{FiducialLayout, LayoutTemplate, PageSize};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fiducial detector configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialParams {
    /// Search window size as a fraction of image width / height.
    pub search_window_frac: f32,
    /// Windows are never smaller than this many expected marker sides.
    pub min_window_sides: f32,
    /// Accepted marker side range, relative to the expected side.
    pub min_size_ratio: f32,
    pub max_size_ratio: f32,
    /// Minimum bounding-box short/long side ratio.
    pub min_squareness: f32,
    /// Minimum fraction of the bounding box covered by ink.
    pub min_fill_ratio: f32,
    /// Minimum `1 - mean/255` of the component pixels.
    pub min_darkness: f32,
    /// Minimum `1 - std/64` of the component pixels.
    pub min_uniformity: f32,
    /// Windows whose intensity range is below this hold no marker.
    pub min_window_contrast: u8,
    /// Weighted score a candidate needs to be accepted.
    pub min_score: f32,
    pub weights: FiducialWeights,
}

/// Weights of the candidate score terms. They should sum to 1.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FiducialWeights {
    pub aspect: f32,
    pub size: f32,
    pub position: f32,
    pub darkness: f32,
    pub uniformity: f32,
}

impl Default for FiducialWeights {
    fn default() -> Self {
        Self {
            aspect: 0.25,
            size: 0.25,
            position: 0.2,
            darkness: 0.15,
            uniformity: 0.15,
        }
    }
}

impl Default for FiducialParams {
    fn default() -> Self {
        Self {
            search_window_frac: 0.2,
            min_window_sides: 3.0,
            min_size_ratio: 0.4,
            max_size_ratio: 2.5,
            min_squareness: 0.5,
            min_fill_ratio: 0.5,
            min_darkness: 0.3,
            min_uniformity: 0.2,
            min_window_contrast: 40,
            min_score: 0.5,
            weights: FiducialWeights::default(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    role: AnchorRole,
    x0: usize,
    y0: usize,
    w: usize,
    h: usize,
    expected: Point2<f32>,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    center: Point2<f32>,
    score: f32,
}

/// Finds the four square corner fiducials of a sheet.
#[derive(Clone, Debug, Default)]
pub struct FiducialDetector {
    params: FiducialParams,
}

impl FiducialDetector {
    pub fn new(params: FiducialParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FiducialParams {
        &self.params
    }

    /// Detect all four fiducials laid out in `template`.
    ///
    /// Fails with [`AnchorError::FiducialsMissing`] listing every corner
    /// without an accepted candidate; a partial set is never returned.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width, height = image.height))
    )]
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        template: &LayoutTemplate,
    ) -> Result<CornerAnchors, AnchorError> {
        let layout = template.fiducials().ok_or(AnchorError::NoFiducialLayout)?;
        let page = template.page();
        let px_per_mm = (image.width as f32 / page.width_mm).min(image.height as f32 / page.height_mm);
        let expected_side = layout.size_mm * px_per_mm;

        let mut found: Vec<Anchor> = Vec::with_capacity(4);
        let mut missing = Vec::new();
        for window in self.windows(image, layout, &page, px_per_mm, expected_side) {
            match self.best_in_window(image, &window, expected_side) {
                Some(c) if c.score >= self.params.min_score => {
                    log::debug!(
                        "fiducial {}: ({:.1}, {:.1}) score {:.3}",
                        window.role,
                        c.center.x,
                        c.center.y,
                        c.score
                    );
                    found.push(Anchor {
                        role: window.role,
                        position: c.center,
                        quality: c.score,
                    });
                }
                best => {
                    log::debug!(
                        "fiducial {}: no accepted candidate (best score {:?})",
                        window.role,
                        best.map(|c| c.score)
                    );
                    missing.push(window.role);
                }
            }
        }

        let [top_left, top_right, bottom_left, bottom_right] = found[..] else {
            return Err(AnchorError::FiducialsMissing { missing });
        };
        Ok(CornerAnchors {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        })
    }

    fn windows(
        &self,
        image: &GrayImageView<'_>,
        layout: &FiducialLayout,
        page: &PageSize,
        px_per_mm: f32,
        expected_side: f32,
    ) -> [Window; 4] {
        let (iw, ih) = (image.width as f32, image.height as f32);
        let size = |extent: f32| {
            let s = (extent * self.params.search_window_frac)
                .max(expected_side * self.params.min_window_sides)
                .min(extent * 0.5);
            s.round().max(1.0) as usize
        };
        let w = size(iw);
        let h = size(ih);
        let right = image.width.saturating_sub(w);
        let bottom = image.height.saturating_sub(h);

        // Expected centers keep their millimeter distance from the nearest page edge.
        let from_right = |x_mm: f32| iw - (page.width_mm - x_mm) * px_per_mm;
        let from_bottom = |y_mm: f32| ih - (page.height_mm - y_mm) * px_per_mm;

        [
            Window {
                role: AnchorRole::TopLeft,
                x0: 0,
                y0: 0,
                w,
                h,
                expected: layout.top_left * px_per_mm,
            },
            Window {
                role: AnchorRole::TopRight,
                x0: right,
                y0: 0,
                w,
                h,
                expected: Point2::new(from_right(layout.top_right.x), layout.top_right.y * px_per_mm),
            },
            Window {
                role: AnchorRole::BottomLeft,
                x0: 0,
                y0: bottom,
                w,
                h,
                expected: Point2::new(
                    layout.bottom_left.x * px_per_mm,
                    from_bottom(layout.bottom_left.y),
                ),
            },
            Window {
                role: AnchorRole::BottomRight,
                x0: right,
                y0: bottom,
                w,
                h,
                expected: Point2::new(
                    from_right(layout.bottom_right.x),
                    from_bottom(layout.bottom_right.y),
                ),
            },
        ]
    }

    fn best_in_window(
        &self,
        image: &GrayImageView<'_>,
        window: &Window,
        expected_side: f32,
    ) -> Option<Candidate> {
        let crop = image.crop(window.x0, window.y0, window.w, window.h);
        if crop.data.is_empty() {
            return None;
        }
        let (lo, hi) = crop
            .data
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi.saturating_sub(lo) < self.params.min_window_contrast {
            return None;
        }

        let view = crop.view();
        let mask = threshold_mask(&view, otsu_threshold(&crop.data));
        let components = label_components(&mask, crop.width, crop.height, Some(&view));

        // Components cut by an inner window edge are partial.
        let cut = |c: &ComponentStats| {
            (c.min_x == 0 && window.x0 > 0)
                || (c.min_y == 0 && window.y0 > 0)
                || (c.max_x as usize + 1 == crop.width && window.x0 + crop.width < image.width)
                || (c.max_y as usize + 1 == crop.height && window.y0 + crop.height < image.height)
        };

        let diag = ((crop.width * crop.width + crop.height * crop.height) as f32).sqrt();
        components
            .iter()
            .filter(|c| !cut(c))
            .filter_map(|c| self.score_component(c, window, expected_side, diag))
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    fn score_component(
        &self,
        c: &ComponentStats,
        window: &Window,
        expected_side: f32,
        window_diag: f32,
    ) -> Option<Candidate> {
        let p = &self.params;
        let side = (c.pixel_count as f32).sqrt();
        let ratio = side / expected_side;
        if ratio < p.min_size_ratio || ratio > p.max_size_ratio {
            return None;
        }
        let aspect = c.squareness();
        if aspect < p.min_squareness || c.fill_ratio() < p.min_fill_ratio {
            return None;
        }
        let darkness = 1.0 - c.mean_intensity() / 255.0;
        let uniformity = (1.0 - c.intensity_std() / 64.0).clamp(0.0, 1.0);
        if darkness < p.min_darkness || uniformity < p.min_uniformity {
            return None;
        }

        let local = c.centroid();
        let center = Point2::new(local.x + window.x0 as f32, local.y + window.y0 as f32);
        let size_score = (1.0 - (side - expected_side).abs() / expected_side).max(0.0);
        let position_score = (1.0 - (center - window.expected).norm() / window_diag).max(0.0);

        let w = &p.weights;
        let score = w.aspect * aspect
            + w.size * size_score
            + w.position * position_score
            + w.darkness * darkness
            + w.uniformity * uniformity;
        Some(Candidate { center, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bubblescan_core::GrayImage;

    const TEMPLATE: &str = r#"{
        "page": { "width_mm": 210.0, "height_mm": 297.0 },
        "option_radius_mm": 2.5,
        "fiducials": {
            "top_left": [12.5, 12.5], "top_right": [197.5, 12.5],
            "bottom_left": [12.5, 284.5], "bottom_right": [197.5, 284.5],
            "size_mm": 15.0
        },
        "questions": { "1": { "options": [ { "label": "A", "x": 33.0, "y": 149.0 } ] } }
    }"#;

    // 2 px/mm page with 30 px fiducials.
    fn page(skip: Option<AnchorRole>) -> GrayImage {
        let mut img = GrayImage::filled(420, 594, 235);
        let centers = [
            (AnchorRole::TopLeft, 25.0, 25.0),
            (AnchorRole::TopRight, 395.0, 25.0),
            (AnchorRole::BottomLeft, 25.0, 569.0),
            (AnchorRole::BottomRight, 395.0, 569.0),
        ];
        for (role, cx, cy) in centers {
            if Some(role) == skip {
                continue;
            }
            for y in (cy as usize - 15)..(cy as usize + 15) {
                for x in (cx as usize - 15)..(cx as usize + 15) {
                    img.data[y * 420 + x] = 25;
                }
            }
        }
        img
    }

    #[test]
    fn finds_all_four_corners() {
        let t = LayoutTemplate::from_json_str(TEMPLATE).expect("template");
        let img = page(None);
        let corners = FiducialDetector::default()
            .detect(&img.view(), &t)
            .expect("detected");
        assert_abs_diff_eq!(corners.top_left.position.x, 25.0, epsilon = 0.6);
        assert_abs_diff_eq!(corners.bottom_right.position.y, 569.0, epsilon = 0.6);
        assert!(corners.min_quality() > 0.9, "{corners:?}");
    }

    #[test]
    fn reports_every_missing_corner() {
        let t = LayoutTemplate::from_json_str(TEMPLATE).expect("template");
        let img = page(Some(AnchorRole::BottomLeft));
        let err = FiducialDetector::default()
            .detect(&img.view(), &t)
            .unwrap_err();
        assert_eq!(
            err,
            AnchorError::FiducialsMissing {
                missing: vec![AnchorRole::BottomLeft]
            }
        );
        assert_eq!(err.to_string(), "fiducials missing at bottom-left");
    }

    #[test]
    fn rejects_undersized_blobs() {
        let t = LayoutTemplate::from_json_str(TEMPLATE).expect("template");
        let mut img = GrayImage::filled(420, 594, 235);
        // 6 px dot where a 30 px marker is expected.
        for y in 22..28 {
            for x in 22..28 {
                img.data[y * 420 + x] = 20;
            }
        }
        let err = FiducialDetector::default()
            .detect(&img.view(), &t)
            .unwrap_err();
        assert!(matches!(err, AnchorError::FiducialsMissing { missing } if missing.len() == 4));
    }
}
