//! Exact registration through recorded fiducial positions.
//!
//! No image search happens here: the four corners come from the fiducial
//! detector. What makes it a separate strategy is the template, whose
//! fiducial millimeter positions were recorded at print time, so a
//! projective fit through them is exact rather than approximate.

use crate::{AnchorError, CornerAnchors};
use bubblescan_core::{homography_from_4pt, Homography};
use bubblescan_layout::LayoutTemplate;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Registration {
    pub corners: CornerAnchors,
    /// Maps template millimeters to image pixels.
    #[serde(skip)]
    pub px_from_mm: Homography,
}

impl Registration {
    pub fn from_fiducials(
        template: &LayoutTemplate,
        corners: CornerAnchors,
    ) -> Result<Self, AnchorError> {
        if !template.exact_registration() {
            return Err(AnchorError::RegistrationUnavailable);
        }
        let layout = template.fiducials().ok_or(AnchorError::NoFiducialLayout)?;
        let mm = [
            layout.top_left,
            layout.top_right,
            layout.bottom_right,
            layout.bottom_left,
        ];
        let px = corners.frame().corners();
        let px_from_mm = homography_from_4pt(&mm, &px).ok_or(AnchorError::DegenerateRegistration)?;
        Ok(Self {
            corners,
            px_from_mm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Anchor, AnchorRole};
    use nalgebra::Point2;

    fn corners(pts: [(f32, f32); 4]) -> CornerAnchors {
        let a = |role, (x, y): (f32, f32)| Anchor {
            role,
            position: Point2::new(x, y),
            quality: 1.0,
        };
        CornerAnchors {
            top_left: a(AnchorRole::TopLeft, pts[0]),
            top_right: a(AnchorRole::TopRight, pts[1]),
            bottom_left: a(AnchorRole::BottomLeft, pts[2]),
            bottom_right: a(AnchorRole::BottomRight, pts[3]),
        }
    }

    fn template(exact: bool) -> LayoutTemplate {
        LayoutTemplate::from_json_str(&format!(
            r#"{{ "page": {{ "width_mm": 210.0, "height_mm": 297.0 }},
                 "option_radius_mm": 2.5,
                 "exact_registration": {exact},
                 "fiducials": {{
                    "top_left": [12.5, 12.5], "top_right": [197.5, 12.5],
                    "bottom_left": [12.5, 284.5], "bottom_right": [197.5, 284.5],
                    "size_mm": 15.0 }},
                 "questions": {{ "1": {{ "options": [ {{ "label": "A", "x": 33.0, "y": 149.0 }} ] }} }} }}"#
        ))
        .expect("template")
    }

    #[test]
    fn fits_exact_transform() {
        let c = corners([(50.0, 50.0), (790.0, 50.0), (50.0, 1138.0), (790.0, 1138.0)]);
        let reg = Registration::from_fiducials(&template(true), c).expect("registration");
        let p = reg.px_from_mm.apply(Point2::new(33.0, 149.0));
        assert!((p.x - 132.0).abs() < 1e-2 && (p.y - 596.0).abs() < 1e-2);
    }

    #[test]
    fn unregistered_template_is_unavailable() {
        let c = corners([(50.0, 50.0), (790.0, 50.0), (50.0, 1138.0), (790.0, 1138.0)]);
        assert_eq!(
            Registration::from_fiducials(&template(false), c),
            Err(AnchorError::RegistrationUnavailable)
        );
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let c = corners([(50.0, 50.0), (100.0, 100.0), (150.0, 150.0), (200.0, 200.0)]);
        assert_eq!(
            Registration::from_fiducials(&template(true), c),
            Err(AnchorError::DegenerateRegistration)
        );
    }
}
