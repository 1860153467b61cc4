use crate::{DecisionParams, ScoringParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named threshold policies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThresholdPreset {
    /// Scanner input: higher floors, wider gaps.
    Strict,
    #[default]
    Balanced,
    /// Phone photos: uneven lighting and lighter pencil.
    LenientPhoto,
}

impl ThresholdPreset {
    pub const ALL: [ThresholdPreset; 3] = [Self::Strict, Self::Balanced, Self::LenientPhoto];

    pub fn name(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Balanced => "balanced",
            Self::LenientPhoto => "lenient-photo",
        }
    }
}

impl fmt::Display for ThresholdPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown threshold preset `{0}` (expected strict, balanced or lenient-photo)")]
pub struct UnknownPreset(pub String);

impl FromStr for ThresholdPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}

/// Scoring and decision parameters applied together.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MarkConfig {
    #[serde(default)]
    pub scoring: ScoringParams,
    #[serde(default)]
    pub decision: DecisionParams,
}

impl MarkConfig {
    pub fn preset(preset: ThresholdPreset) -> Self {
        let scoring = ScoringParams::default();
        let decision = DecisionParams::default();
        match preset {
            ThresholdPreset::Balanced => Self { scoring, decision },
            ThresholdPreset::Strict => Self {
                scoring,
                decision: DecisionParams {
                    blank_core_fill: 20.0,
                    blank_score: 30.0,
                    real_mark_core_fill: 50.0,
                    multiple_marks_gap: 12.0,
                    low_confidence_gap: 20.0,
                    ..decision
                },
            },
            ThresholdPreset::LenientPhoto => Self {
                scoring: ScoringParams {
                    core_factor: 0.7,
                    core_floor: 15.0,
                    ..scoring
                },
                decision: DecisionParams {
                    blank_core_fill: 10.0,
                    blank_score: 15.0,
                    real_mark_core_fill: 30.0,
                    multiple_marks_gap: 8.0,
                    low_confidence_gap: 12.0,
                    ..decision
                },
            },
        }
    }
}

impl From<ThresholdPreset> for MarkConfig {
    fn from(preset: ThresholdPreset) -> Self {
        Self::preset(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_names_round_trip() {
        for p in ThresholdPreset::ALL {
            assert_eq!(p.to_string().parse::<ThresholdPreset>(), Ok(p));
            let json = serde_json::to_string(&p).expect("serialize");
            assert_eq!(json, format!("\"{}\"", p.name()));
        }
        assert!("photo".parse::<ThresholdPreset>().is_err());
    }

    #[test]
    fn presets_order_blank_floors() {
        let strict = MarkConfig::preset(ThresholdPreset::Strict).decision;
        let balanced = MarkConfig::preset(ThresholdPreset::Balanced).decision;
        let lenient = MarkConfig::preset(ThresholdPreset::LenientPhoto).decision;
        assert!(strict.blank_core_fill > balanced.blank_core_fill);
        assert!(balanced.blank_core_fill > lenient.blank_core_fill);
        assert!(strict.real_mark_core_fill > lenient.real_mark_core_fill);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: MarkConfig =
            serde_json::from_str(r#"{ "decision": { "blank_core_fill": 12.0 } }"#).expect("config");
        assert_eq!(cfg.decision.blank_core_fill, 12.0);
        assert_eq!(cfg.decision.multiple_marks_gap, 10.0);
        assert_eq!(cfg.scoring.core_factor, ScoringParams::default().core_factor);
    }
}
