//! Synthetic answer sheets for end-to-end tests.
#![allow(dead_code)]

use bubblescan::anchors::{RecognizedToken, StaticTokens, TokenBox};
use bubblescan::core::GrayImage;
use bubblescan::{CalibrationPoint, LayoutTemplate, ManualCalibration};
use nalgebra::{Point2, Rotation2, Vector2};

pub const PX_PER_MM: f32 = 4.0;
pub const PAGE_MM: (f32, f32) = (105.0, 148.0);
pub const QUESTIONS: u32 = 10;
pub const LABELS: [&str; 4] = ["A", "B", "C", "D"];
pub const OPTION_RADIUS_MM: f32 = 3.0;
pub const FIDUCIAL_MM: f32 = 8.0;
const FIDUCIALS: [(f32, f32); 4] = [(10.0, 10.0), (95.0, 10.0), (10.0, 138.0), (95.0, 138.0)];
/// Question labels are printed this far left of option A.
const LABEL_OFFSET_MM: f32 = 15.0;

const PAPER: u8 = 228;
const RING: u8 = 90;
const INK: u8 = 40;
const MARKER: u8 = 20;

pub fn option_mm(question: u32, label: &str) -> Point2<f32> {
    let col = LABELS.iter().position(|l| *l == label).unwrap_or(0);
    Point2::new(35.0 + 10.0 * col as f32, 30.0 + 9.0 * (question - 1) as f32)
}

/// What the template declares.
#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateOptions {
    pub fiducials: bool,
    pub exact_registration: bool,
    pub row_anchor: bool,
}

pub fn template_json(opts: TemplateOptions) -> String {
    let questions: Vec<String> = (1..=QUESTIONS)
        .map(|q| {
            let options: Vec<String> = LABELS
                .iter()
                .map(|l| {
                    let p = option_mm(q, l);
                    format!(r#"{{ "label": "{l}", "x": {}, "y": {} }}"#, p.x, p.y)
                })
                .collect();
            format!(r#""{q}": {{ "options": [{}] }}"#, options.join(", "))
        })
        .collect();
    let mut extra = String::new();
    if opts.fiducials {
        let [tl, tr, bl, br] = FIDUCIALS;
        extra.push_str(&format!(
            r#""fiducials": {{ "top_left": [{}, {}], "top_right": [{}, {}],
                 "bottom_left": [{}, {}], "bottom_right": [{}, {}], "size_mm": {FIDUCIAL_MM} }},"#,
            tl.0, tl.1, tr.0, tr.1, bl.0, bl.1, br.0, br.1
        ));
    }
    if opts.exact_registration {
        extra.push_str(r#""exact_registration": true,"#);
    }
    if opts.row_anchor {
        extra.push_str(&format!(
            r#""row_anchor": {{ "first_option_offset_mm": {LABEL_OFFSET_MM}, "option_spacing_mm": 10.0 }},"#
        ));
    }
    format!(
        r#"{{ "version": "test-1",
             "page": {{ "width_mm": {}, "height_mm": {} }},
             "option_radius_mm": {OPTION_RADIUS_MM},
             {extra}
             "questions": {{ {} }} }}"#,
        PAGE_MM.0,
        PAGE_MM.1,
        questions.join(", ")
    )
}

pub fn template(opts: TemplateOptions) -> LayoutTemplate {
    LayoutTemplate::from_json_str(&template_json(opts)).expect("template")
}

/// How the sheet was printed, filled and captured.
#[derive(Clone, Debug, Default)]
pub struct SheetSpec {
    pub fiducials: bool,
    /// Capture rotation about the image center.
    pub angle_deg: f32,
    pub marks: Vec<(u32, &'static str)>,
}

impl SheetSpec {
    pub fn answered(fiducials: bool) -> Self {
        Self {
            fiducials,
            angle_deg: 0.0,
            marks: standard_marks(),
        }
    }

    fn center(&self) -> Vector2<f32> {
        Vector2::new(0.5 * PAGE_MM.0, 0.5 * PAGE_MM.1) * PX_PER_MM
    }

    /// Page millimeters to image pixels.
    pub fn project(&self, mm: Point2<f32>) -> Point2<f32> {
        let c = self.center();
        let rot = Rotation2::new(self.angle_deg.to_radians());
        Point2::from(rot * (mm.coords * PX_PER_MM - c) + c)
    }

    pub fn render(&self) -> GrayImage {
        let w = (PAGE_MM.0 * PX_PER_MM).round() as usize;
        let h = (PAGE_MM.1 * PX_PER_MM).round() as usize;
        let mut img = GrayImage::filled(w, h, PAPER);
        let c = self.center();
        let inv = Rotation2::new(-self.angle_deg.to_radians());
        let half = 0.5 * FIDUCIAL_MM;
        let ring_mm = 2.0 / PX_PER_MM;

        let options: Vec<(Point2<f32>, bool)> = (1..=QUESTIONS)
            .flat_map(|q| LABELS.iter().map(move |l| (q, *l)))
            .map(|(q, l)| (option_mm(q, l), self.marks.contains(&(q, l))))
            .collect();

        for y in 0..h {
            for x in 0..w {
                let px = Vector2::new(x as f32 + 0.5, y as f32 + 0.5);
                let mm = Point2::from((inv * (px - c) + c) / PX_PER_MM);
                let mut value = PAPER;
                if self.fiducials
                    && FIDUCIALS
                        .iter()
                        .any(|f| (mm.x - f.0).abs() <= half && (mm.y - f.1).abs() <= half)
                {
                    value = MARKER;
                }
                for (center, filled) in &options {
                    let d = (mm - center).norm();
                    if *filled && d <= 0.9 * OPTION_RADIUS_MM {
                        value = INK;
                    } else if d <= OPTION_RADIUS_MM && d >= OPTION_RADIUS_MM - ring_mm {
                        value = value.min(RING);
                    }
                }
                img.data[y * w + x] = value;
            }
        }
        img
    }

    /// Question-number tokens at the printed label positions, for the first
    /// `count` questions.
    pub fn tokens(&self, count: u32) -> StaticTokens {
        StaticTokens(
            (1..=count.min(QUESTIONS))
                .map(|q| {
                    let a = option_mm(q, "A");
                    let center = self.project(Point2::new(a.x - LABEL_OFFSET_MM, a.y));
                    RecognizedToken {
                        text: format!("{q}."),
                        confidence: 91.0,
                        bbox: TokenBox {
                            x: center.x - 8.0,
                            y: center.y - 10.0,
                            width: 16.0,
                            height: 20.0,
                        },
                    }
                })
                .collect(),
        )
    }

    /// Exact clicks on the four outermost options.
    pub fn calibration(&self) -> ManualCalibration {
        let click = |question: u32, option: &str| {
            let p = self.project(option_mm(question, option));
            CalibrationPoint {
                question,
                option: option.to_string(),
                pixel_x: p.x,
                pixel_y: p.y,
            }
        };
        ManualCalibration::new(vec![
            click(1, "A"),
            click(1, "D"),
            click(QUESTIONS, "A"),
            click(QUESTIONS, "D"),
        ])
    }
}

/// 1A, 2C, 3 blank, 4B+4D, 5D, 6A, 7 blank, 8B, 9C, 10A.
pub fn standard_marks() -> Vec<(u32, &'static str)> {
    vec![
        (1, "A"),
        (2, "C"),
        (4, "B"),
        (4, "D"),
        (5, "D"),
        (6, "A"),
        (8, "B"),
        (9, "C"),
        (10, "A"),
    ]
}

/// Expected single answers for [`standard_marks`].
pub fn expected_answers() -> Vec<(u32, Option<&'static str>)> {
    vec![
        (1, Some("A")),
        (2, Some("C")),
        (3, None),
        (5, Some("D")),
        (6, Some("A")),
        (7, None),
        (8, Some("B")),
        (9, Some("C")),
        (10, Some("A")),
    ]
}

pub fn to_image(img: &GrayImage) -> image::GrayImage {
    image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .expect("buffer size")
}
