//! Question-number labels as row anchors.
//!
//! Text recognition itself is an external concern behind [`TextRecognizer`];
//! [`StaticTokens`] replays words recognized elsewhere, either as JSON or as
//! tesseract TSV. This module keeps only confident numeric tokens of the
//! form `12` or `12.` that name a question in the template, one anchor per
//! question.

use crate::{Anchor, AnchorError, AnchorRole};
use bubblescan_core::GrayImageView;
use bubblescan_layout::LayoutTemplate;
use nalgebra::Point2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

#[cfg(feature = "tracing")]
use tracing::instrument;

static QUESTION_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.?$").expect("valid question-number pattern"));

/// Axis-aligned token bounds in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TokenBox {
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }
}

/// One recognized word.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecognizedToken {
    pub text: String,
    /// Recognizer confidence in `[0, 100]`.
    pub confidence: f32,
    pub bbox: TokenBox,
}

/// Text recognition restricted to the characters in `whitelist`.
pub trait TextRecognizer {
    fn recognize(&self, image: &GrayImageView<'_>, whitelist: &str) -> Vec<RecognizedToken>;
}

/// Tokens recognized ahead of time, e.g. by an OCR service, loaded from JSON.
///
/// Characters outside the whitelist are stripped, mimicking a recognizer
/// configured with that whitelist.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticTokens(pub Vec<RecognizedToken>);

impl TextRecognizer for StaticTokens {
    fn recognize(&self, _image: &GrayImageView<'_>, whitelist: &str) -> Vec<RecognizedToken> {
        self.0
            .iter()
            .map(|t| RecognizedToken {
                text: t.text.chars().filter(|c| whitelist.contains(*c)).collect(),
                ..t.clone()
            })
            .collect()
    }
}

/// Failure to read tesseract's TSV word output.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("tesseract TSV is missing the `{0}` column")]
    MissingColumn(&'static str),
    #[error("line {line}: invalid `{column}` value `{value}`")]
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
    },
}

const TSV_COLUMNS: [&str; 7] = ["level", "left", "top", "width", "height", "conf", "text"];
/// Row level of single words in tesseract's TSV output.
const TSV_WORD_LEVEL: u32 = 5;

fn tsv_field<T: FromStr>(
    fields: &[&str],
    at: usize,
    column: &'static str,
    line: usize,
) -> Result<T, TokenParseError> {
    let raw = fields.get(at).map_or("", |f| f.trim());
    raw.parse().map_err(|_| TokenParseError::InvalidField {
        line,
        column,
        value: raw.to_string(),
    })
}

impl StaticTokens {
    /// Words from tesseract's TSV output (`tesseract page.png stdout tsv`).
    ///
    /// Columns are located by header name. Rows above word level, rows
    /// without text and rows with a negative confidence are skipped.
    pub fn from_tesseract_tsv(tsv: &str) -> Result<Self, TokenParseError> {
        let mut lines = tsv
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());
        let Some((_, header)) = lines.next() else {
            return Ok(Self::default());
        };
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        let mut index = [0usize; TSV_COLUMNS.len()];
        for (slot, column) in index.iter_mut().zip(TSV_COLUMNS) {
            *slot = names
                .iter()
                .position(|n| *n == column)
                .ok_or(TokenParseError::MissingColumn(column))?;
        }
        let [level, left, top, width, height, conf, text] = index;

        let mut tokens = Vec::new();
        for (i, line) in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            let n = i + 1;
            if tsv_field::<u32>(&fields, level, "level", n)? != TSV_WORD_LEVEL {
                continue;
            }
            let word = fields.get(text).map_or("", |t| t.trim());
            let confidence: f32 = tsv_field(&fields, conf, "conf", n)?;
            if word.is_empty() || confidence < 0.0 {
                continue;
            }
            tokens.push(RecognizedToken {
                text: word.to_string(),
                confidence,
                bbox: TokenBox {
                    x: tsv_field(&fields, left, "left", n)?,
                    y: tsv_field(&fields, top, "top", n)?,
                    width: tsv_field(&fields, width, "width", n)?,
                    height: tsv_field(&fields, height, "height", n)?,
                },
            });
        }
        Ok(Self(tokens))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TextAnchorParams {
    pub whitelist: String,
    /// Tokens below this recognizer confidence are ignored.
    pub min_confidence: f32,
    /// Fraction of template questions that must be anchored.
    pub min_coverage: f32,
}

impl Default for TextAnchorParams {
    fn default() -> Self {
        Self {
            whitelist: "0123456789.".to_string(),
            min_confidence: 50.0,
            min_coverage: 0.8,
        }
    }
}

/// Anchors keyed by question number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextAnchors {
    pub anchors: Vec<Anchor>,
    pub expected: usize,
}

impl TextAnchors {
    pub fn positions(&self) -> BTreeMap<u32, Point2<f32>> {
        self.anchors
            .iter()
            .filter_map(|a| match a.role {
                AnchorRole::Row(n) => Some((n, a.position)),
                _ => None,
            })
            .collect()
    }

    pub fn coverage(&self) -> f32 {
        self.anchors.len() as f32 / self.expected.max(1) as f32
    }
}

#[derive(Clone, Debug, Default)]
pub struct TextAnchorDetector {
    params: TextAnchorParams,
}

impl TextAnchorDetector {
    pub fn new(params: TextAnchorParams) -> Self {
        Self { params }
    }

    /// Parse a question number from a token, e.g. `"12."` -> `12`.
    pub fn parse_question_number(text: &str) -> Option<u32> {
        QUESTION_NUMBER.captures(text.trim())?.get(1)?.as_str().parse().ok()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width, height = image.height))
    )]
    pub fn detect(
        &self,
        image: &GrayImageView<'_>,
        recognizer: &dyn TextRecognizer,
        template: &LayoutTemplate,
    ) -> Result<TextAnchors, AnchorError> {
        if template.row_anchor().is_none() {
            return Err(AnchorError::NoRowLayout);
        }
        let expected = template.questions().len();

        let mut best: BTreeMap<u32, Anchor> = BTreeMap::new();
        for token in recognizer.recognize(image, &self.params.whitelist) {
            if token.confidence < self.params.min_confidence {
                continue;
            }
            let Some(n) = Self::parse_question_number(&token.text) else {
                continue;
            };
            if template.question(n).is_none() {
                continue;
            }
            let anchor = Anchor {
                role: AnchorRole::Row(n),
                position: token.bbox.center(),
                quality: (token.confidence / 100.0).clamp(0.0, 1.0),
            };
            best.entry(n)
                .and_modify(|a| {
                    if anchor.quality > a.quality {
                        *a = anchor;
                    }
                })
                .or_insert(anchor);
        }

        // Small slack keeps e.g. 0.8 * 10 at 8 despite float rounding.
        let required = (self.params.min_coverage * expected as f32 - 1e-4).ceil() as usize;
        let found = best.len();
        log::debug!("text anchors: {found}/{expected} (required {required})");
        if found < required.max(1) {
            return Err(AnchorError::InsufficientTextAnchors { found, required });
        }
        Ok(TextAnchors {
            anchors: best.into_values().collect(),
            expected,
        })
    }
}
