//! Geometric sanity checks applied to a candidate resolution before it is
//! accepted.

use bubblescan_layout::{PageFrame, Region, Resolution};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Two options may overlap by this fraction of their summed radii before
    /// spacing counts as collapsed.
    pub overlap_tolerance: f32,
    /// Option centers closer than this (pixels) always count as collapsed.
    pub min_spacing_px: f32,
    /// Allowed relative deviation of the detected frame aspect ratio from
    /// the template's.
    pub max_aspect_error: f32,
    /// Frames with a side shorter than this (pixels) are degenerate.
    pub min_frame_side_px: f32,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            overlap_tolerance: 0.5,
            min_spacing_px: 3.0,
            max_aspect_error: 0.2,
            min_frame_side_px: 8.0,
        }
    }
}

/// Detected image frame together with the aspect ratio it should have.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameCheck {
    pub frame: PageFrame,
    pub expected_aspect: f32,
}

/// Outcome of the geometric checks on one resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub regions: usize,
    pub in_bounds: usize,
    /// `in_bounds / regions`, 0 when nothing was resolved.
    pub in_bounds_fraction: f32,
    pub adjacent_pairs: usize,
    /// Option pairs whose spacing collapsed: adjacent options of one
    /// question, or options of two different questions.
    pub spacing_violations: usize,
    /// Regions taking part in at least one collapsed pair.
    pub collapsed_regions: usize,
    pub min_spacing_px: Option<f32>,
    /// Relative aspect-ratio error of the anchor frame, when one was checked.
    pub aspect_error: Option<f32>,
    pub frame_degenerate: bool,
    /// Questions dropped by the resolver.
    pub dropped_questions: usize,
    /// Overall quality in `[0, 1]`.
    pub quality: f32,
}

impl ValidationSummary {
    pub fn spacing_ok(&self) -> bool {
        self.spacing_violations == 0
    }

    pub fn frame_ok(&self, params: &ValidationParams) -> bool {
        !self.frame_degenerate && self.aspect_error.is_none_or(|e| e <= params.max_aspect_error)
    }
}

/// Per-strategy acceptance bar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationGate {
    /// Minimum fraction of regions inside the image.
    pub min_in_bounds: f32,
    pub check_spacing: bool,
    pub check_frame: bool,
}

impl ValidationGate {
    pub fn passes(&self, summary: &ValidationSummary, params: &ValidationParams) -> bool {
        summary.regions > 0
            && summary.in_bounds_fraction >= self.min_in_bounds
            && (!self.check_spacing || summary.spacing_ok())
            && (!self.check_frame || summary.frame_ok(params))
    }
}

fn too_close(a: &Region, b: &Region, params: &ValidationParams) -> bool {
    let d = (b.center - a.center).norm();
    d < params.min_spacing_px || d < (a.radius + b.radius) * (1.0 - params.overlap_tolerance)
}

/// Check a resolution against a `width x height` image.
pub fn validate_regions(
    resolution: &Resolution,
    width: usize,
    height: usize,
    frame: Option<&FrameCheck>,
    params: &ValidationParams,
) -> ValidationSummary {
    let regions = resolution.region_count();
    let in_bounds = resolution.regions().filter(|r| r.inside(width, height)).count();

    let mut adjacent_pairs = 0;
    let mut spacing_violations = 0;
    let mut min_spacing: Option<f32> = None;
    let mut collapsed = vec![false; regions];
    let mut offset = 0;
    for q in &resolution.questions {
        for (i, pair) in q.regions.windows(2).enumerate() {
            let d = (pair[1].center - pair[0].center).norm();
            adjacent_pairs += 1;
            min_spacing = Some(min_spacing.map_or(d, |m| m.min(d)));
            if too_close(&pair[0], &pair[1], params) {
                spacing_violations += 1;
                collapsed[offset + i] = true;
                collapsed[offset + i + 1] = true;
            }
        }
        offset += q.regions.len();
    }

    // Options of different questions must not land on each other either.
    let indexed: Vec<(usize, &Region)> = resolution
        .questions
        .iter()
        .enumerate()
        .flat_map(|(qi, q)| q.regions.iter().map(move |r| (qi, r)))
        .collect();
    for (a, (qa, ra)) in indexed.iter().enumerate() {
        for (b, (qb, rb)) in indexed.iter().enumerate().skip(a + 1) {
            if qa != qb && too_close(ra, rb, params) {
                spacing_violations += 1;
                collapsed[a] = true;
                collapsed[b] = true;
            }
        }
    }
    let collapsed_regions = collapsed.iter().filter(|c| **c).count();

    let (frame_degenerate, aspect_error) = match frame {
        Some(check) => {
            let degenerate = check.frame.is_degenerate(params.min_frame_side_px);
            let error = (check.expected_aspect > 0.0 && !degenerate)
                .then(|| (check.frame.aspect_ratio() / check.expected_aspect - 1.0).abs());
            (degenerate, error)
        }
        None => (false, None),
    };

    let in_bounds_fraction = if regions == 0 {
        0.0
    } else {
        in_bounds as f32 / regions as f32
    };
    let spacing_fraction = if regions == 0 {
        1.0
    } else {
        1.0 - collapsed_regions as f32 / regions as f32
    };
    let frame_factor = match (frame_degenerate, aspect_error) {
        (true, _) => 0.0,
        (false, Some(e)) => (1.0 - e).clamp(0.0, 1.0),
        (false, None) => 1.0,
    };

    ValidationSummary {
        regions,
        in_bounds,
        in_bounds_fraction,
        adjacent_pairs,
        spacing_violations,
        collapsed_regions,
        min_spacing_px: min_spacing,
        aspect_error,
        frame_degenerate,
        dropped_questions: resolution.dropped.len(),
        quality: in_bounds_fraction * spacing_fraction * frame_factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bubblescan_layout::QuestionRegions;
    use nalgebra::Point2;

    fn row(question: u32, spacing: f32, x0: f32, y: f32, radius: f32) -> QuestionRegions {
        let regions = (0..4)
            .map(|i| Region {
                question,
                label: ["A", "B", "C", "D"][i].to_string(),
                center: Point2::new(x0 + i as f32 * spacing, y),
                radius,
            })
            .collect();
        QuestionRegions { question, regions }
    }

    fn resolution(spacing: f32, x0: f32) -> Resolution {
        Resolution {
            questions: vec![row(1, spacing, x0, 50.0, 5.0)],
            dropped: Vec::new(),
            px_per_mm: 2.0,
        }
    }

    #[test]
    fn well_spaced_regions_pass() {
        let s = validate_regions(&resolution(16.0, 20.0), 200, 100, None, &ValidationParams::default());
        assert_eq!(s.regions, 4);
        assert_eq!(s.in_bounds, 4);
        assert_eq!(s.adjacent_pairs, 3);
        assert!(s.spacing_ok());
        assert_abs_diff_eq!(s.quality, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn collapsed_spacing_is_flagged() {
        let params = ValidationParams::default();
        let s = validate_regions(&resolution(1.0, 20.0), 200, 100, None, &params);
        assert_eq!(s.spacing_violations, 3);
        assert_eq!(s.quality, 0.0);
        let gate = ValidationGate {
            min_in_bounds: 0.0,
            check_spacing: true,
            check_frame: false,
        };
        assert!(!gate.passes(&s, &params));
    }

    #[test]
    fn questions_resolved_onto_each_other_are_rejected() {
        let params = ValidationParams::default();
        let gate = ValidationGate {
            min_in_bounds: 0.9,
            check_spacing: true,
            check_frame: false,
        };
        let stacked = Resolution {
            questions: vec![
                row(1, 40.0, 100.0, 100.0, 12.0),
                row(2, 40.0, 100.0, 100.0, 12.0),
            ],
            dropped: Vec::new(),
            px_per_mm: 4.0,
        };
        let s = validate_regions(&stacked, 400, 400, None, &params);
        assert_eq!(s.in_bounds, 8);
        assert_eq!(s.spacing_violations, 4);
        assert_eq!(s.collapsed_regions, 8);
        assert_eq!(s.quality, 0.0);
        assert!(!gate.passes(&s, &params));

        let separate = Resolution {
            questions: vec![
                row(1, 40.0, 100.0, 100.0, 12.0),
                row(2, 40.0, 100.0, 136.0, 12.0),
            ],
            ..stacked
        };
        let s = validate_regions(&separate, 400, 400, None, &params);
        assert!(s.spacing_ok());
        assert_eq!(s.collapsed_regions, 0);
        assert!(gate.passes(&s, &params));
    }

    #[test]
    fn out_of_bounds_regions_lower_quality() {
        let s = validate_regions(&resolution(16.0, 160.0), 200, 100, None, &ValidationParams::default());
        assert_eq!(s.in_bounds, 2);
        assert_abs_diff_eq!(s.in_bounds_fraction, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn frame_aspect_mismatch_fails_frame_check() {
        let params = ValidationParams::default();
        let check = FrameCheck {
            frame: PageFrame::from_rect(0.0, 0.0, 200.0, 100.0),
            expected_aspect: 1.0,
        };
        let s = validate_regions(&resolution(16.0, 20.0), 200, 100, Some(&check), &params);
        assert!(!s.frame_ok(&params));

        let square = FrameCheck {
            frame: PageFrame::from_rect(0.0, 0.0, 100.0, 100.0),
            expected_aspect: 1.0,
        };
        let s = validate_regions(&resolution(16.0, 20.0), 200, 100, Some(&square), &params);
        assert!(s.frame_ok(&params));
        assert_abs_diff_eq!(s.quality, 1.0, epsilon = 1e-6);
    }
}
