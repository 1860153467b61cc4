//! Anchor detection for answer sheets.
//!
//! Each detector answers "where is the page?" in its own way and returns
//! either a complete anchor set or an [`AnchorError`]. Partial results are
//! never returned: a missing corner or too few labels is a failure, so that
//! incomplete geometry can never turn into wrong coordinates downstream.

mod anchor;
mod error;
mod fiducial;
mod pattern;
mod registration;
mod text;

pub use anchor::{Anchor, AnchorRole, CornerAnchors};
pub use error::AnchorError;
pub use fiducial::{FiducialDetector, FiducialParams, FiducialWeights};
pub use pattern::{OptionRows, PatternDetector, PatternParams};
pub use registration::Registration;
pub use text::{
    RecognizedToken, StaticTokens, TextAnchorDetector, TextAnchorParams, TextAnchors,
    TextRecognizer, TokenBox, TokenParseError,
};
