//! Question-number recognition through the `tesseract` command-line tool.
//!
//! The page is written to a temporary PNG and `tesseract` is asked for its
//! word-level TSV on stdout, restricted to the text-anchor whitelist. Any
//! failure (missing executable, non-zero exit, unreadable output) is logged
//! and yields no tokens, so the text-anchor strategy fails like any other
//! strategy and the orchestrator moves on.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(feature = "tesseract")]
use bubblescan_anchors::{RecognizedToken, StaticTokens, TextRecognizer, TokenParseError};
#[cfg(feature = "tesseract")]
use bubblescan_core::GrayImageView;
#[cfg(feature = "tesseract")]
use std::process::Command;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractParams {
    /// Executable name or path.
    pub program: PathBuf,
    pub language: String,
    /// Page segmentation mode; 11 looks for sparse text in no particular order.
    pub page_segmentation: u8,
}

impl Default for TesseractParams {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            language: "eng".to_string(),
            page_segmentation: 11,
        }
    }
}

#[cfg(feature = "tesseract")]
#[derive(thiserror::Error, Debug)]
pub enum OcrError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] image::ImageError),
    #[error("image buffer does not match its dimensions")]
    Buffer,
    #[error("tesseract exited with {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error(transparent)]
    Tokens(#[from] TokenParseError),
}

/// [`TextRecognizer`] running the `tesseract` executable on each call.
#[cfg(feature = "tesseract")]
#[derive(Clone, Debug, Default)]
pub struct TesseractRecognizer {
    params: TesseractParams,
}

#[cfg(feature = "tesseract")]
impl TesseractRecognizer {
    pub fn new(params: TesseractParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TesseractParams {
        &self.params
    }

    /// Arguments following the input image path.
    fn args(&self, whitelist: &str) -> Vec<String> {
        vec![
            "stdout".to_string(),
            "-l".to_string(),
            self.params.language.clone(),
            "--psm".to_string(),
            self.params.page_segmentation.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={whitelist}"),
            "tsv".to_string(),
        ]
    }

    /// Run `tesseract` once and parse its word output.
    pub fn run(&self, image: &GrayImageView<'_>, whitelist: &str) -> Result<StaticTokens, OcrError> {
        let page = image::GrayImage::from_raw(
            image.width as u32,
            image.height as u32,
            image.data.to_vec(),
        )
        .ok_or(OcrError::Buffer)?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("page.png");
        page.save(&path)?;

        let output = Command::new(&self.params.program)
            .arg(&path)
            .args(self.args(whitelist))
            .output()?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(StaticTokens::from_tesseract_tsv(&String::from_utf8_lossy(
            &output.stdout,
        ))?)
    }
}

#[cfg(feature = "tesseract")]
impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &GrayImageView<'_>, whitelist: &str) -> Vec<RecognizedToken> {
        match self.run(image, whitelist) {
            Ok(tokens) => {
                log::debug!("tesseract recognized {} words", tokens.0.len());
                tokens.recognize(image, whitelist)
            }
            Err(err) => {
                log::warn!("tesseract recognition failed: {err}");
                Vec::new()
            }
        }
    }
}
