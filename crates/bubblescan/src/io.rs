//! JSON configuration and report helpers.

use crate::calibration::{CalibrationError, ManualCalibration};
use crate::engine::{SheetOutcome, SheetReaderParams};
use crate::ocr::TesseractParams;
use crate::orchestrator::OrchestratorParams;
use crate::strategy::StrategyKind;
use bubblescan_anchors::{
    FiducialParams, PatternParams, StaticTokens, TextAnchorParams, TokenParseError,
};
use bubblescan_core::ImageError;
use bubblescan_layout::{LayoutTemplate, TemplateError};
use bubblescan_marks::{DecisionParams, MarkConfig, ScoringParams, ThresholdPreset};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum SheetError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Tokens(#[from] TokenParseError),
    #[error("{0} support is not compiled in (enable the `{0}` feature)")]
    RecognizerUnavailable(&'static str),
    #[cfg(feature = "image")]
    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

/// Configuration for reading one sheet from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetConfig {
    pub image_path: String,
    pub template_path: String,
    #[serde(default)]
    pub preset: ThresholdPreset,
    /// Pre-recognized text tokens for the text-anchor strategy: a JSON
    /// array, or tesseract TSV when the path ends in `.tsv`.
    #[serde(default)]
    pub tokens_path: Option<String>,
    /// Run `tesseract` on the sheet when no tokens file is given.
    #[serde(default)]
    pub tesseract: Option<TesseractParams>,
    /// Manual calibration points (JSON array); bypasses detection.
    #[serde(default)]
    pub calibration_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    #[serde(default)]
    pub strategies: Option<Vec<StrategyKind>>,
    #[serde(default)]
    pub fiducial: Option<FiducialParams>,
    #[serde(default)]
    pub text: Option<TextAnchorParams>,
    #[serde(default)]
    pub pattern: Option<PatternParams>,
    #[serde(default)]
    pub scoring: Option<ScoringParams>,
    #[serde(default)]
    pub decision: Option<DecisionParams>,
    #[serde(default)]
    pub orchestrator: Option<OrchestratorParams>,
}

impl SheetConfig {
    /// Minimal config with every optional field unset.
    pub fn new(image_path: impl Into<String>, template_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            template_path: template_path.into(),
            preset: ThresholdPreset::default(),
            tokens_path: None,
            tesseract: None,
            calibration_path: None,
            output_path: None,
            deadline_ms: None,
            strategies: None,
            fiducial: None,
            text: None,
            pattern: None,
            scoring: None,
            decision: None,
            orchestrator: None,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SheetError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("bubblescan_report.json"))
    }

    /// Preset first, then explicit overrides.
    pub fn reader_params(&self) -> SheetReaderParams {
        let preset = MarkConfig::preset(self.preset);
        let mut params = SheetReaderParams {
            marks: MarkConfig {
                scoring: self.scoring.clone().unwrap_or(preset.scoring),
                decision: self.decision.clone().unwrap_or(preset.decision),
            },
            ..SheetReaderParams::default()
        };
        if let Some(p) = &self.fiducial {
            params.fiducial = p.clone();
        }
        if let Some(p) = &self.text {
            params.text = p.clone();
        }
        if let Some(p) = &self.pattern {
            params.pattern = p.clone();
        }
        if let Some(p) = &self.orchestrator {
            params.orchestrator = p.clone();
        }
        if let Some(s) = &self.strategies {
            params.strategies = s.clone();
        }
        if self.deadline_ms.is_some() {
            params.orchestrator.deadline_ms = self.deadline_ms;
        }
        params
    }

    pub fn load_template(&self) -> Result<LayoutTemplate, SheetError> {
        Ok(LayoutTemplate::load_json(&self.template_path)?)
    }

    pub fn load_tokens(&self) -> Result<Option<StaticTokens>, SheetError> {
        self.tokens_path
            .as_ref()
            .map(|p| -> Result<StaticTokens, SheetError> {
                let raw = fs::read_to_string(p)?;
                let is_tsv = Path::new(p)
                    .extension()
                    .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
                if is_tsv {
                    Ok(StaticTokens::from_tesseract_tsv(&raw)?)
                } else {
                    Ok(serde_json::from_str(&raw)?)
                }
            })
            .transpose()
    }

    pub fn load_calibration(&self) -> Result<Option<ManualCalibration>, SheetError> {
        Ok(self
            .calibration_path
            .as_ref()
            .map(ManualCalibration::load_json)
            .transpose()?)
    }
}

/// Serialized result of one sheet run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetReport {
    pub image_path: String,
    pub template_version: String,
    pub preset: ThresholdPreset,
    pub outcome: SheetOutcome,
}

impl SheetReport {
    pub fn from_outcome(config: &SheetConfig, template: &LayoutTemplate, outcome: SheetOutcome) -> Self {
        Self {
            image_path: config.image_path.clone(),
            template_version: template.version().to_string(),
            preset: config.preset,
            outcome,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), SheetError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}
