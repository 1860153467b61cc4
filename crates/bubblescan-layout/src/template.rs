//! Answer-sheet layout templates.
//!
//! The on-disk form is [`RawLayoutTemplate`]; [`LayoutTemplate`] is the
//! validated form every other component consumes. Validation happens once, at
//! load time. Sheet-level defects are errors; defects confined to one
//! question skip that question and are kept in [`LayoutTemplate::issues`].

use crate::frame::PageFrame;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::{fs, path::Path};

/// Slack allowed around `[0, 1]` for normalized positions.
const NORMALIZED_SLACK: f32 = 0.05;

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid page size {width_mm} x {height_mm} mm")]
    InvalidPage { width_mm: f32, height_mm: f32 },
    #[error("option radius must be positive (got {0} mm)")]
    InvalidRadius(f32),
    #[error("invalid fiducial layout: {0}")]
    InvalidFiducials(&'static str),
    #[error("invalid row anchor layout: {0}")]
    InvalidRowAnchor(&'static str),
    #[error("exact registration requires fiducial positions")]
    RegistrationWithoutFiducials,
    #[error("template has no usable questions ({skipped} skipped)")]
    NoQuestions { skipped: usize },
}

/// Per-question template defect. The question is skipped, the sheet is not.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateIssue {
    #[error("question id `{id}` is not a number")]
    NonNumericId { id: String },
    #[error("question {id} is defined more than once")]
    DuplicateQuestion { id: u32 },
    #[error("question {id} has no options")]
    NoOptions { id: u32 },
    #[error("question {id} repeats option `{label}`")]
    DuplicateLabel { id: u32, label: String },
    #[error("question {id} option `{label}` has an unusable position")]
    BadPosition { id: u32, label: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width_mm: f32,
    pub height_mm: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionUnits {
    /// Millimeters from the page's top-left corner.
    #[default]
    Millimeters,
    /// Fractions of the fiducial rectangle (or of the page when the template
    /// has no fiducials).
    Normalized,
}

/// Printed corner-marker centers in page millimeters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiducialLayout {
    pub top_left: Point2<f32>,
    pub top_right: Point2<f32>,
    pub bottom_left: Point2<f32>,
    pub bottom_right: Point2<f32>,
    /// Side length of the square markers.
    pub size_mm: f32,
}

impl FiducialLayout {
    pub fn frame(&self) -> PageFrame {
        PageFrame::new(
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        )
    }

    fn validate(&self) -> Result<(), TemplateError> {
        let pts = [
            self.top_left,
            self.top_right,
            self.bottom_left,
            self.bottom_right,
        ];
        if !pts.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
            return Err(TemplateError::InvalidFiducials("non-finite position"));
        }
        if !(self.size_mm.is_finite() && self.size_mm > 0.0) {
            return Err(TemplateError::InvalidFiducials("size must be positive"));
        }
        if self.top_left.x >= self.top_right.x || self.bottom_left.x >= self.bottom_right.x {
            return Err(TemplateError::InvalidFiducials("left markers must be left of right markers"));
        }
        if self.top_left.y >= self.bottom_left.y || self.top_right.y >= self.bottom_right.y {
            return Err(TemplateError::InvalidFiducials("top markers must be above bottom markers"));
        }
        Ok(())
    }
}

/// Geometry of the printed question-number labels used as row anchors.
///
/// The label sits `first_option_offset_mm` to the left of the first option,
/// and options follow every `option_spacing_mm` on the same row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowAnchorLayout {
    pub first_option_offset_mm: f32,
    pub option_spacing_mm: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawOption {
    pub label: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawQuestion {
    pub options: Vec<RawOption>,
}

fn default_version() -> String {
    "2.0".to_string()
}

/// Template as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawLayoutTemplate {
    #[serde(default = "default_version")]
    pub version: String,
    pub page: PageSize,
    #[serde(default)]
    pub units: PositionUnits,
    pub option_radius_mm: f32,
    #[serde(default)]
    pub fiducials: Option<FiducialLayout>,
    /// Fiducial positions were recorded when the sheet was printed, so a
    /// projective fit through them is exact.
    #[serde(default)]
    pub exact_registration: bool,
    #[serde(default)]
    pub row_anchor: Option<RowAnchorLayout>,
    /// Question id (decimal string) to options.
    pub questions: BTreeMap<String, RawQuestion>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionLayout {
    pub label: String,
    pub position_mm: Point2<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionLayout {
    pub id: u32,
    pub options: Vec<OptionLayout>,
}

impl QuestionLayout {
    /// Where the printed question number sits, given the row-anchor geometry.
    pub fn label_position_mm(&self, rows: &RowAnchorLayout) -> Option<Point2<f32>> {
        let first = self.options.first()?;
        Some(Point2::new(
            first.position_mm.x - rows.first_option_offset_mm,
            first.position_mm.y,
        ))
    }
}

/// Validated, immutable layout. All positions are page millimeters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LayoutTemplate {
    version: String,
    page: PageSize,
    option_radius_mm: f32,
    fiducials: Option<FiducialLayout>,
    exact_registration: bool,
    row_anchor: Option<RowAnchorLayout>,
    questions: Vec<QuestionLayout>,
    issues: Vec<TemplateIssue>,
}

impl LayoutTemplate {
    /// Load and validate a JSON template from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TemplateError> {
        let raw: RawLayoutTemplate = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawLayoutTemplate) -> Result<Self, TemplateError> {
        let page = raw.page;
        if !(page.width_mm.is_finite()
            && page.height_mm.is_finite()
            && page.width_mm > 0.0
            && page.height_mm > 0.0)
        {
            return Err(TemplateError::InvalidPage {
                width_mm: page.width_mm,
                height_mm: page.height_mm,
            });
        }
        if !(raw.option_radius_mm.is_finite() && raw.option_radius_mm > 0.0) {
            return Err(TemplateError::InvalidRadius(raw.option_radius_mm));
        }
        if let Some(f) = &raw.fiducials {
            f.validate()?;
        }
        if raw.exact_registration && raw.fiducials.is_none() {
            return Err(TemplateError::RegistrationWithoutFiducials);
        }
        if let Some(r) = &raw.row_anchor {
            if !(r.option_spacing_mm.is_finite() && r.option_spacing_mm > 0.0) {
                return Err(TemplateError::InvalidRowAnchor("option spacing must be positive"));
            }
            if !r.first_option_offset_mm.is_finite() {
                return Err(TemplateError::InvalidRowAnchor("non-finite first option offset"));
            }
        }

        // Normalized values are relative to the fiducial rectangle if there is one.
        let reference = match raw.fiducials {
            Some(f) => f.frame(),
            None => PageFrame::from_rect(0.0, 0.0, page.width_mm, page.height_mm),
        };

        let mut issues = Vec::new();
        let mut questions: BTreeMap<u32, QuestionLayout> = BTreeMap::new();

        for (key, q) in raw.questions {
            let Ok(id) = key.trim().parse::<u32>() else {
                issues.push(TemplateIssue::NonNumericId { id: key });
                continue;
            };
            if questions.contains_key(&id) {
                issues.push(TemplateIssue::DuplicateQuestion { id });
                continue;
            }
            match validate_question(id, q, raw.units, &page, &reference) {
                Ok(layout) => {
                    questions.insert(id, layout);
                }
                Err(issue) => issues.push(issue),
            }
        }

        for issue in &issues {
            log::warn!("template: skipping question: {issue}");
        }
        if questions.is_empty() {
            return Err(TemplateError::NoQuestions {
                skipped: issues.len(),
            });
        }

        Ok(Self {
            version: raw.version,
            page,
            option_radius_mm: raw.option_radius_mm,
            fiducials: raw.fiducials,
            exact_registration: raw.exact_registration,
            row_anchor: raw.row_anchor,
            questions: questions.into_values().collect(),
            issues,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn page(&self) -> PageSize {
        self.page
    }

    pub fn option_radius_mm(&self) -> f32 {
        self.option_radius_mm
    }

    pub fn fiducials(&self) -> Option<&FiducialLayout> {
        self.fiducials.as_ref()
    }

    pub fn exact_registration(&self) -> bool {
        self.exact_registration
    }

    pub fn row_anchor(&self) -> Option<&RowAnchorLayout> {
        self.row_anchor.as_ref()
    }

    /// Usable questions, sorted by id.
    pub fn questions(&self) -> &[QuestionLayout] {
        &self.questions
    }

    pub fn question(&self, id: u32) -> Option<&QuestionLayout> {
        self.questions
            .binary_search_by_key(&id, |q| q.id)
            .ok()
            .map(|i| &self.questions[i])
    }

    /// Defects found while loading; each one skipped a question.
    pub fn issues(&self) -> &[TemplateIssue] {
        &self.issues
    }

    pub fn option_count(&self) -> usize {
        self.questions.iter().map(|q| q.options.len()).sum()
    }

    /// Page extent as a frame in millimeters.
    pub fn page_frame_mm(&self) -> PageFrame {
        PageFrame::from_rect(0.0, 0.0, self.page.width_mm, self.page.height_mm)
    }

    /// Axis-aligned bounding rectangle of all option centers, in millimeters.
    pub fn option_extent_mm(&self) -> PageFrame {
        let mut min = Point2::new(f32::INFINITY, f32::INFINITY);
        let mut max = Point2::new(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for o in self.questions.iter().flat_map(|q| &q.options) {
            min.x = min.x.min(o.position_mm.x);
            min.y = min.y.min(o.position_mm.y);
            max.x = max.x.max(o.position_mm.x);
            max.y = max.y.max(o.position_mm.y);
        }
        PageFrame::from_rect(min.x, min.y, max.x, max.y)
    }
}

fn validate_question(
    id: u32,
    q: RawQuestion,
    units: PositionUnits,
    page: &PageSize,
    reference: &PageFrame,
) -> Result<QuestionLayout, TemplateIssue> {
    if q.options.is_empty() {
        return Err(TemplateIssue::NoOptions { id });
    }
    let mut seen = HashSet::new();
    let mut options = Vec::with_capacity(q.options.len());
    for o in q.options {
        if !seen.insert(o.label.clone()) {
            return Err(TemplateIssue::DuplicateLabel { id, label: o.label });
        }
        let position_mm = match units {
            PositionUnits::Millimeters => {
                let inside = (0.0..=page.width_mm).contains(&o.x)
                    && (0.0..=page.height_mm).contains(&o.y);
                inside.then(|| Point2::new(o.x, o.y))
            }
            PositionUnits::Normalized => {
                let range = -NORMALIZED_SLACK..=1.0 + NORMALIZED_SLACK;
                (range.contains(&o.x) && range.contains(&o.y))
                    .then(|| reference.relative_to_pixel(o.x, o.y))
            }
        };
        let Some(position_mm) = position_mm else {
            return Err(TemplateIssue::BadPosition { id, label: o.label });
        };
        options.push(OptionLayout {
            label: o.label,
            position_mm,
        });
    }
    Ok(QuestionLayout { id, options })
}
