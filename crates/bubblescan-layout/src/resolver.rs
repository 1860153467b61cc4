//! Template millimeters to image pixels.

use crate::frame::PageFrame;
use crate::region::{QuestionRegions, Region};
use crate::template::{LayoutTemplate, QuestionLayout};
use bubblescan_core::Homography;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Anchor pairs closer than this (in template mm) do not vote on scale.
const MIN_SCALE_BASELINE_MM: f32 = 1.0;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("anchor frame is degenerate")]
    DegenerateFrame,
    #[error("template frame is degenerate")]
    DegenerateTemplateFrame,
    #[error("template has no row-anchor geometry")]
    NoRowLayout,
    #[error("no row anchors to resolve from")]
    NoAnchors,
    #[error("could not derive a pixel scale")]
    InvalidScale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Text-anchor resolution found no label for this question.
    NoRowAnchor,
    /// At least one option did not map to a finite pixel position.
    UnmappablePosition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedQuestion {
    pub question: u32,
    pub reason: DropReason,
}

/// Regions for every fully resolved question plus the ones that were dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub questions: Vec<QuestionRegions>,
    pub dropped: Vec<DroppedQuestion>,
    /// Observed pixels per template millimeter.
    pub px_per_mm: f32,
}

impl Resolution {
    pub fn region_count(&self) -> usize {
        self.questions.iter().map(|q| q.regions.len()).sum()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.questions.iter().flat_map(|q| q.regions.iter())
    }
}

/// Projects a [`LayoutTemplate`] onto an image using detected geometry.
///
/// Every method either emits all options of a question or drops the question.
pub struct CoordinateResolver<'a> {
    template: &'a LayoutTemplate,
}

impl<'a> CoordinateResolver<'a> {
    pub fn new(template: &'a LayoutTemplate) -> Self {
        Self { template }
    }

    pub fn template(&self) -> &LayoutTemplate {
        self.template
    }

    /// Map through matching frames: `template_frame` in millimeters, `image_frame`
    /// in pixels. Positions are expressed as fractions of the template frame and
    /// re-applied to the image frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(questions = self.template.questions().len()))
    )]
    pub fn resolve_frame(
        &self,
        image_frame: &PageFrame,
        template_frame: &PageFrame,
    ) -> Result<Resolution, ResolveError> {
        if image_frame.is_degenerate(1.0) {
            return Err(ResolveError::DegenerateFrame);
        }
        if template_frame.is_degenerate(f32::EPSILON) {
            return Err(ResolveError::DegenerateTemplateFrame);
        }
        let px_per_mm = 0.5
            * (image_frame.mean_width() / template_frame.mean_width()
                + image_frame.mean_height() / template_frame.mean_height());
        if !(px_per_mm.is_finite() && px_per_mm > 0.0) {
            return Err(ResolveError::InvalidScale);
        }
        let radius = self.template.option_radius_mm() * px_per_mm;

        Ok(self.resolve_each(px_per_mm, |q| {
            q.options
                .iter()
                .map(|o| {
                    let (u, v) = template_frame.pixel_to_relative(o.position_mm)?;
                    Some((image_frame.relative_to_pixel(u, v), radius))
                })
                .collect()
        }))
    }

    /// Map through a projective transform from template millimeters to pixels.
    /// Radii follow the local scale of the transform at each option.
    pub fn resolve_homography(&self, px_from_mm: &Homography) -> Result<Resolution, ResolveError> {
        let page = self.template.page();
        let center = Point2::new(0.5 * page.width_mm, 0.5 * page.height_mm);
        let px_per_mm = px_from_mm.local_scale(center) as f32;
        if !(px_per_mm.is_finite() && px_per_mm > 0.0) {
            return Err(ResolveError::InvalidScale);
        }
        let r_mm = self.template.option_radius_mm();

        Ok(self.resolve_each(px_per_mm, |q| {
            q.options
                .iter()
                .map(|o| {
                    let scale = px_from_mm.local_scale(o.position_mm) as f32;
                    Some((px_from_mm.apply(o.position_mm), r_mm * scale))
                })
                .collect()
        }))
    }

    /// Resolve from question-number anchors: each option sits at the label
    /// position plus the template's horizontal offset and spacing.
    ///
    /// The pixel scale is the median ratio of anchor pixel distance to label
    /// millimeter distance, falling back to `image_width / page_width` when
    /// fewer than two anchors are usable.
    pub fn resolve_rows(
        &self,
        anchors: &BTreeMap<u32, Point2<f32>>,
        image_width: usize,
    ) -> Result<Resolution, ResolveError> {
        let rows = *self.template.row_anchor().ok_or(ResolveError::NoRowLayout)?;
        if anchors.is_empty() {
            return Err(ResolveError::NoAnchors);
        }

        let px_per_mm = self
            .row_scale(anchors, &rows)
            .unwrap_or(image_width as f32 / self.template.page().width_mm);
        if !(px_per_mm.is_finite() && px_per_mm > 0.0) {
            return Err(ResolveError::InvalidScale);
        }
        let radius = self.template.option_radius_mm() * px_per_mm;

        let mut res = self.resolve_each(px_per_mm, |q| {
            let anchor = anchors.get(&q.id)?;
            (0..q.options.len())
                .map(|i| {
                    let dx = (rows.first_option_offset_mm + i as f32 * rows.option_spacing_mm)
                        * px_per_mm;
                    Some((*anchor + Vector2::new(dx, 0.0), radius))
                })
                .collect()
        });
        for d in &mut res.dropped {
            if !anchors.contains_key(&d.question) {
                d.reason = DropReason::NoRowAnchor;
            }
        }
        Ok(res)
    }

    /// Treat the image borders as the page borders.
    pub fn resolve_proportional(
        &self,
        width: usize,
        height: usize,
    ) -> Result<Resolution, ResolveError> {
        let image_frame = PageFrame::from_rect(0.0, 0.0, width as f32, height as f32);
        self.resolve_frame(&image_frame, &self.template.page_frame_mm())
    }

    fn row_scale(
        &self,
        anchors: &BTreeMap<u32, Point2<f32>>,
        rows: &crate::template::RowAnchorLayout,
    ) -> Option<f32> {
        let known: Vec<(Point2<f32>, Point2<f32>)> = anchors
            .iter()
            .filter_map(|(id, px)| {
                let mm = self.template.question(*id)?.label_position_mm(rows)?;
                Some((*px, mm))
            })
            .collect();

        let mut ratios: Vec<f32> = Vec::new();
        for (i, (pa, ma)) in known.iter().enumerate() {
            for (pb, mb) in known.iter().skip(i + 1) {
                let d_mm = (mb - ma).norm();
                if d_mm >= MIN_SCALE_BASELINE_MM {
                    ratios.push((pb - pa).norm() / d_mm);
                }
            }
        }
        if ratios.is_empty() {
            return None;
        }
        ratios.sort_by(f32::total_cmp);
        Some(ratios[ratios.len() / 2])
    }

    fn resolve_each<F>(&self, px_per_mm: f32, mut place: F) -> Resolution
    where
        F: FnMut(&QuestionLayout) -> Option<Vec<(Point2<f32>, f32)>>,
    {
        let mut questions = Vec::with_capacity(self.template.questions().len());
        let mut dropped = Vec::new();

        for q in self.template.questions() {
            let placed = place(q).filter(|v| {
                v.len() == q.options.len()
                    && v.iter()
                        .all(|(p, r)| p.x.is_finite() && p.y.is_finite() && r.is_finite() && *r > 0.0)
            });
            let Some(placed) = placed else {
                dropped.push(DroppedQuestion {
                    question: q.id,
                    reason: DropReason::UnmappablePosition,
                });
                continue;
            };
            let regions = q
                .options
                .iter()
                .zip(placed)
                .map(|(o, (center, radius))| Region {
                    question: q.id,
                    label: o.label.clone(),
                    center,
                    radius,
                })
                .collect();
            questions.push(QuestionRegions {
                question: q.id,
                regions,
            });
        }

        if !dropped.is_empty() {
            log::debug!("resolver: dropped {} question(s)", dropped.len());
        }
        Resolution {
            questions,
            dropped,
            px_per_mm,
        }
    }
}
