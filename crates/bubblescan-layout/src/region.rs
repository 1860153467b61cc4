use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One answer option located in the image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub question: u32,
    pub label: String,
    pub center: Point2<f32>,
    /// Radius in pixels.
    pub radius: f32,
}

impl Region {
    /// Whether the whole disk lies inside a `width x height` image.
    pub fn inside(&self, width: usize, height: usize) -> bool {
        let r = self.radius;
        self.center.x - r >= 0.0
            && self.center.y - r >= 0.0
            && self.center.x + r <= width as f32
            && self.center.y + r <= height as f32
    }
}

/// All option regions of one question, in template option order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionRegions {
    pub question: u32,
    pub regions: Vec<Region>,
}
