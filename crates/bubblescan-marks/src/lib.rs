//! Fill scoring and per-question decisions.
//!
//! [`MarkScorer`] measures one option region at a time as a pure function of
//! the pixels. [`DecisionEngine`] turns the scores of one question into a
//! [`QuestionOutcome`]. [`ThresholdPreset`] names the supported parameter sets.
//!
//! ```
//! use bubblescan_marks::{Classification, DecisionEngine, RegionScore};
//!
//! let score = |label: &str, s: f32| RegionScore {
//!     label: label.to_string(),
//!     darkness: s,
//!     coverage: s,
//!     core_fill: s,
//!     score: s,
//! };
//! let outcome = DecisionEngine::default().decide(1, &[score("A", 85.0), score("B", 12.0)]);
//! assert_eq!(outcome.classification, Classification::Selected);
//! assert_eq!(outcome.selected.as_deref(), Some("A"));
//! ```

mod decision;
mod presets;
mod scorer;
mod stats;

pub use decision::{Classification, DecisionEngine, DecisionParams, QuestionOutcome};
pub use presets::{MarkConfig, ThresholdPreset, UnknownPreset};
pub use scorer::{MarkScorer, QuestionScores, RegionError, RegionScore, ScoringParams};
pub use stats::{DetectionStats, UNCERTAIN_BELOW};
