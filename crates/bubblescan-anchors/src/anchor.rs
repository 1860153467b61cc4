use bubblescan_layout::PageFrame;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRole {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    /// Printed label of question N.
    Row(u32),
}

impl AnchorRole {
    pub const CORNERS: [AnchorRole; 4] = [
        AnchorRole::TopLeft,
        AnchorRole::TopRight,
        AnchorRole::BottomLeft,
        AnchorRole::BottomRight,
    ];
}

impl fmt::Display for AnchorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorRole::TopLeft => f.write_str("top-left"),
            AnchorRole::TopRight => f.write_str("top-right"),
            AnchorRole::BottomLeft => f.write_str("bottom-left"),
            AnchorRole::BottomRight => f.write_str("bottom-right"),
            AnchorRole::Row(n) => write!(f, "row {n} label"),
        }
    }
}

/// A detected reference point. Produced fresh for each image.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub role: AnchorRole,
    pub position: Point2<f32>,
    /// Detection quality in `[0, 1]`.
    pub quality: f32,
}

/// Exactly one anchor per page corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerAnchors {
    pub top_left: Anchor,
    pub top_right: Anchor,
    pub bottom_left: Anchor,
    pub bottom_right: Anchor,
}

impl CornerAnchors {
    pub fn frame(&self) -> PageFrame {
        PageFrame::new(
            self.top_left.position,
            self.top_right.position,
            self.bottom_right.position,
            self.bottom_left.position,
        )
    }

    pub fn to_vec(&self) -> Vec<Anchor> {
        vec![
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ]
    }

    pub fn min_quality(&self) -> f32 {
        self.to_vec()
            .iter()
            .map(|a| a.quality)
            .fold(f32::INFINITY, f32::min)
    }

    pub fn mean_quality(&self) -> f32 {
        self.to_vec().iter().map(|a| a.quality).sum::<f32>() / 4.0
    }
}
