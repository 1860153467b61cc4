//! Manual calibration from caller-supplied option positions.
//!
//! A reviewer clicks at least four option centers on the image; the template
//! millimeter positions of those options and the clicked pixels define a
//! projective fit that places every other option. Detection is bypassed.

use crate::orchestrator::StrategyResult;
use crate::strategy::StrategyKind;
use crate::validation::{validate_regions, ValidationParams};
use bubblescan_core::estimate_homography;
use bubblescan_layout::{CoordinateResolver, LayoutTemplate, ResolveError};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const MIN_CALIBRATION_POINTS: usize = 4;

/// Template positions closer to a line than this (mm) count as collinear.
const COLLINEAR_TOLERANCE_MM: f32 = 0.5;

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("manual calibration needs at least {MIN_CALIBRATION_POINTS} points, got {0}")]
    TooFewPoints(usize),
    #[error("question {question} has no option `{option}`")]
    UnknownOption { question: u32, option: String },
    #[error("question {question} option `{option}` is given more than once")]
    DuplicateRegion { question: u32, option: String },
    #[error("calibration points are collinear in the template")]
    Collinear,
    #[error("calibration points do not define an invertible mapping")]
    Degenerate,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One clicked option center.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub question: u32,
    pub option: String,
    pub pixel_x: f32,
    pub pixel_y: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualCalibration {
    pub points: Vec<CalibrationPoint>,
}

impl ManualCalibration {
    pub fn new(points: Vec<CalibrationPoint>) -> Self {
        Self { points }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Fit the template onto a `width x height` image. The result is always
    /// accepted; its validation summary is informational.
    pub fn fit(
        &self,
        template: &LayoutTemplate,
        width: usize,
        height: usize,
        validation: &ValidationParams,
    ) -> Result<StrategyResult, CalibrationError> {
        if self.points.len() < MIN_CALIBRATION_POINTS {
            return Err(CalibrationError::TooFewPoints(self.points.len()));
        }

        let mut seen = HashSet::new();
        let mut mm = Vec::with_capacity(self.points.len());
        let mut px = Vec::with_capacity(self.points.len());
        for p in &self.points {
            let position = template
                .question(p.question)
                .and_then(|q| q.options.iter().find(|o| o.label == p.option))
                .map(|o| o.position_mm)
                .ok_or_else(|| CalibrationError::UnknownOption {
                    question: p.question,
                    option: p.option.clone(),
                })?;
            if !seen.insert((p.question, p.option.as_str())) {
                return Err(CalibrationError::DuplicateRegion {
                    question: p.question,
                    option: p.option.clone(),
                });
            }
            mm.push(position);
            px.push(Point2::new(p.pixel_x, p.pixel_y));
        }
        if all_collinear(&mm) {
            return Err(CalibrationError::Collinear);
        }

        let px_from_mm = estimate_homography(&mm, &px).ok_or(CalibrationError::Degenerate)?;
        if px_from_mm.inverse().is_none() {
            return Err(CalibrationError::Degenerate);
        }
        let resolution = CoordinateResolver::new(template).resolve_homography(&px_from_mm)?;
        let summary = validate_regions(&resolution, width, height, None, validation);
        log::info!(
            "manual calibration: {} points, {} regions ({} in bounds)",
            self.points.len(),
            summary.regions,
            summary.in_bounds
        );
        Ok(StrategyResult::new(
            StrategyKind::ManualCalibration,
            resolution,
            summary,
            Vec::new(),
        ))
    }
}

/// True when every point lies within tolerance of the line through the two
/// farthest-apart points.
fn all_collinear(points: &[Point2<f32>]) -> bool {
    let mut best = (0, 0, 0.0_f32);
    for (i, a) in points.iter().enumerate() {
        for (j, b) in points.iter().enumerate().skip(i + 1) {
            let d = (b - a).norm();
            if d > best.2 {
                best = (i, j, d);
            }
        }
    }
    let (i, j, len) = best;
    if len <= f32::EPSILON {
        return true;
    }
    let dir = (points[j] - points[i]) / len;
    points.iter().all(|p| {
        let v = p - points[i];
        (v.x * dir.y - v.y * dir.x).abs() <= COLLINEAR_TOLERANCE_MM
    })
}
