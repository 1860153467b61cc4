//! High-level facade crate for the `bubblescan-*` workspace.
//!
//! This crate provides:
//! - stable re-exports of the underlying geometry, layout, anchor and mark crates
//! - the strategy orchestrator that locates the answer grid on a captured sheet,
//!   falling back from the most reliable method to the least, and asking for
//!   manual calibration when nothing validates
//! - [`SheetReader`], which ties location, mark scoring and decisions together
//! - (feature-gated) helpers that run the whole pipeline on an `image::GrayImage`
//!
//! ## Quickstart
//!
//! ```no_run
//! use bubblescan::detect;
//! use bubblescan::layout::LayoutTemplate;
//! use bubblescan::{SheetOutcome, SheetReader, SheetReaderParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = LayoutTemplate::load_json("template.json")?;
//! let img = detect::load_gray("sheet.png")?;
//! let reader = SheetReader::new(template, SheetReaderParams::default());
//!
//! match detect::read_sheet_image(&reader, &img, None, None)? {
//!     SheetOutcome::Read(result) => {
//!         for outcome in &result.outcomes {
//!             println!("{}: {:?} ({})", outcome.question, outcome.selected, outcome.classification);
//!         }
//!     }
//!     SheetOutcome::CalibrationRequired { required, .. } => {
//!         println!("manual calibration needed: {:?}", required.reason);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `bubblescan::core`: gray images, homographies, thresholds, capture quality.
//! - `bubblescan::layout`: templates, page frames and the coordinate resolver.
//! - `bubblescan::anchors`: fiducial, text-anchor, registration and pattern detection.
//! - `bubblescan::marks`: mark scoring, decisions, presets and statistics.
//! - `bubblescan::detect` (feature `image`): end-to-end helpers from `image::GrayImage`.
//! - `TesseractRecognizer` (feature `tesseract`): question numbers read by the
//!   `tesseract` executable for the text-anchor strategy.

pub use bubblescan_anchors as anchors;
pub use bubblescan_core as core;
pub use bubblescan_layout as layout;
pub use bubblescan_marks as marks;

mod calibration;
mod engine;
mod io;
mod ocr;
mod orchestrator;
mod strategy;
mod validation;

pub use calibration::{CalibrationError, CalibrationPoint, ManualCalibration, MIN_CALIBRATION_POINTS};
pub use engine::{SheetOutcome, SheetReader, SheetReaderParams, SheetResult};
pub use io::{SheetConfig, SheetError, SheetReport};
pub use ocr::TesseractParams;
#[cfg(feature = "tesseract")]
pub use ocr::{OcrError, TesseractRecognizer};
pub use orchestrator::{
    AttemptOutcome, CalibrationReason, CalibrationRequired, OrchestratorOutcome,
    OrchestratorParams, OrchestratorState, StrategyAttempt, StrategyOrchestrator, StrategyResult,
};
pub use strategy::{
    FiducialStrategy, LocateError, LocateStrategy, Located, PatternStrategy,
    ProportionalGridStrategy, RegistrationStrategy, StrategyContext, StrategyKind,
    TextAnchorStrategy, UnknownStrategy,
};
pub use validation::{
    validate_regions, FrameCheck, ValidationGate, ValidationParams, ValidationSummary,
};

pub use bubblescan_layout::LayoutTemplate;
pub use bubblescan_marks::{Classification, QuestionOutcome, ThresholdPreset};

#[cfg(feature = "image")]
pub mod detect;
