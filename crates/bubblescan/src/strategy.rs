//! Locate strategies: one anchor detector paired with one resolver mode.

use crate::validation::{FrameCheck, ValidationGate};
use bubblescan_anchors::{
    Anchor, AnchorError, CornerAnchors, FiducialDetector, PatternDetector, Registration,
    TextAnchorDetector, TextRecognizer,
};
use bubblescan_core::GrayImageView;
use bubblescan_layout::{CoordinateResolver, LayoutTemplate, Resolution, ResolveError};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;

/// Built-in strategies, declared from most to least reliable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Caller-supplied point correspondences; bypasses detection.
    ManualCalibration,
    /// Exact projective fit through fiducials recorded at print time.
    Registration,
    TextAnchors,
    Fiducials,
    InferredPattern,
    ProportionalGrid,
}

impl StrategyKind {
    /// Automatic strategies in default trial order.
    pub const AUTOMATIC: [StrategyKind; 5] = [
        Self::Registration,
        Self::TextAnchors,
        Self::Fiducials,
        Self::InferredPattern,
        Self::ProportionalGrid,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ManualCalibration => "manual-calibration",
            Self::Registration => "registration",
            Self::TextAnchors => "text-anchors",
            Self::Fiducials => "fiducials",
            Self::InferredPattern => "inferred-pattern",
            Self::ProportionalGrid => "proportional-grid",
        }
    }

    /// Reliability rank, 0 is most trusted.
    pub fn rank(self) -> u8 {
        match self {
            Self::ManualCalibration => 0,
            Self::Registration => 1,
            Self::TextAnchors => 2,
            Self::Fiducials => 3,
            Self::InferredPattern => 4,
            Self::ProportionalGrid => 5,
        }
    }

    /// Nominal accuracy (percent) of a validated result.
    pub fn estimated_accuracy(self) -> f32 {
        match self {
            Self::ManualCalibration | Self::Registration => 100.0,
            Self::TextAnchors => 95.0,
            Self::Fiducials => 90.0,
            Self::InferredPattern => 85.0,
            Self::ProportionalGrid => 75.0,
        }
    }

    pub fn default_gate(self) -> ValidationGate {
        let (min_in_bounds, check_spacing, check_frame) = match self {
            Self::ManualCalibration => (0.0, false, false),
            Self::Registration => (0.95, true, true),
            Self::TextAnchors => (0.9, true, false),
            Self::Fiducials => (0.8, true, true),
            Self::InferredPattern => (0.7, true, false),
            // Only requires that coordinates land in the image.
            Self::ProportionalGrid => (0.95, false, false),
        };
        ValidationGate {
            min_in_bounds,
            check_spacing,
            check_frame,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown strategy `{0}`")]
pub struct UnknownStrategy(pub String);

impl std::str::FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::ManualCalibration]
            .into_iter()
            .chain(Self::AUTOMATIC)
            .find(|k| k.name() == s.trim())
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Inputs shared by all strategy attempts on one image.
///
/// Fiducial detection is run at most once and reused by every strategy that
/// needs the corners.
pub struct StrategyContext<'a> {
    pub image: GrayImageView<'a>,
    pub template: &'a LayoutTemplate,
    pub recognizer: Option<&'a dyn TextRecognizer>,
    fiducials: OnceCell<Result<CornerAnchors, AnchorError>>,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        image: GrayImageView<'a>,
        template: &'a LayoutTemplate,
        recognizer: Option<&'a dyn TextRecognizer>,
    ) -> Self {
        Self {
            image,
            template,
            recognizer,
            fiducials: OnceCell::new(),
        }
    }

    pub fn fiducials(&self, detector: &FiducialDetector) -> Result<CornerAnchors, AnchorError> {
        self.fiducials
            .get_or_init(|| detector.detect(&self.image, self.template))
            .clone()
    }
}

/// Why a strategy produced no resolution.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LocateError {
    #[error("not applicable: {0}")]
    NotApplicable(&'static str),
    #[error(transparent)]
    Anchors(#[from] AnchorError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// A strategy's candidate geometry, not yet validated.
#[derive(Clone, Debug)]
pub struct Located {
    pub resolution: Resolution,
    pub anchors: Vec<Anchor>,
    pub frame: Option<FrameCheck>,
}

pub trait LocateStrategy {
    fn kind(&self) -> StrategyKind;

    fn gate(&self) -> ValidationGate {
        self.kind().default_gate()
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError>;
}

fn fiducial_frame_check(corners: &CornerAnchors, template: &LayoutTemplate) -> Option<FrameCheck> {
    template.fiducials().map(|layout| FrameCheck {
        frame: corners.frame(),
        expected_aspect: layout.frame().aspect_ratio(),
    })
}

pub struct RegistrationStrategy {
    pub detector: FiducialDetector,
}

impl LocateStrategy for RegistrationStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Registration
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
        if !ctx.template.exact_registration() {
            return Err(LocateError::NotApplicable("template is not registered"));
        }
        let corners = ctx.fiducials(&self.detector)?;
        let registration = Registration::from_fiducials(ctx.template, corners)?;
        let resolution =
            CoordinateResolver::new(ctx.template).resolve_homography(&registration.px_from_mm)?;
        Ok(Located {
            resolution,
            anchors: corners.to_vec(),
            frame: fiducial_frame_check(&corners, ctx.template),
        })
    }
}

pub struct TextAnchorStrategy {
    pub detector: TextAnchorDetector,
}

impl LocateStrategy for TextAnchorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TextAnchors
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
        let Some(recognizer) = ctx.recognizer else {
            return Err(LocateError::NotApplicable("no text recognizer"));
        };
        if ctx.template.row_anchor().is_none() {
            return Err(LocateError::NotApplicable("template has no row-anchor layout"));
        }
        let anchors = self.detector.detect(&ctx.image, recognizer, ctx.template)?;
        let resolution = CoordinateResolver::new(ctx.template)
            .resolve_rows(&anchors.positions(), ctx.image.width)?;
        Ok(Located {
            resolution,
            anchors: anchors.anchors,
            frame: None,
        })
    }
}

pub struct FiducialStrategy {
    pub detector: FiducialDetector,
}

impl LocateStrategy for FiducialStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fiducials
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
        let Some(layout) = ctx.template.fiducials() else {
            return Err(LocateError::NotApplicable("template has no fiducials"));
        };
        let corners = ctx.fiducials(&self.detector)?;
        let resolution =
            CoordinateResolver::new(ctx.template).resolve_frame(&corners.frame(), &layout.frame())?;
        Ok(Located {
            resolution,
            anchors: corners.to_vec(),
            frame: fiducial_frame_check(&corners, ctx.template),
        })
    }
}

pub struct PatternStrategy {
    pub detector: PatternDetector,
}

impl LocateStrategy for PatternStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::InferredPattern
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
        let corners = self.detector.detect(&ctx.image, ctx.template)?;
        let resolution = CoordinateResolver::new(ctx.template)
            .resolve_frame(&corners.frame(), &ctx.template.option_extent_mm())?;
        Ok(Located {
            resolution,
            anchors: corners.to_vec(),
            frame: None,
        })
    }
}

pub struct ProportionalGridStrategy;

impl LocateStrategy for ProportionalGridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ProportionalGrid
    }

    fn locate(&self, ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
        let resolution = CoordinateResolver::new(ctx.template)
            .resolve_proportional(ctx.image.width, ctx.image.height)?;
        Ok(Located {
            resolution,
            anchors: Vec::new(),
            frame: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn automatic_order_follows_rank() {
        let ranks: Vec<u8> = StrategyKind::AUTOMATIC.iter().map(|k| k.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert!(StrategyKind::AUTOMATIC
            .windows(2)
            .all(|w| w[0].estimated_accuracy() >= w[1].estimated_accuracy()));
    }

    #[test]
    fn names_parse_back() {
        for k in StrategyKind::AUTOMATIC {
            assert_eq!(k.name().parse::<StrategyKind>(), Ok(k));
        }
        assert_eq!(
            "manual-calibration".parse::<StrategyKind>(),
            Ok(StrategyKind::ManualCalibration)
        );
        assert!("guess".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn grid_gate_ignores_spacing() {
        let gate = StrategyKind::ProportionalGrid.default_gate();
        assert!(!gate.check_spacing && !gate.check_frame);
        assert!(StrategyKind::Registration.default_gate().min_in_bounds
            > StrategyKind::Fiducials.default_gate().min_in_bounds);
    }
}
