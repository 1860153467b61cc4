use crate::{Classification, QuestionOutcome};
use serde::{Deserialize, Serialize};

/// Confidence below which a decided question is counted as uncertain.
pub const UNCERTAIN_BELOW: f32 = 70.0;

/// Per-sheet outcome counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: usize,
    pub selected: usize,
    pub blank: usize,
    pub ambiguous_multiple: usize,
    pub low_confidence: usize,
    pub unscorable: usize,
    /// Selections (clear or low-confidence) with confidence under [`UNCERTAIN_BELOW`].
    pub uncertain: usize,
    /// Questions decided over fewer options than the template lists.
    pub partial: usize,
}

impl DetectionStats {
    pub fn from_outcomes(outcomes: &[QuestionOutcome]) -> Self {
        let mut s = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for o in outcomes {
            match o.classification {
                Classification::Selected => s.selected += 1,
                Classification::Blank => s.blank += 1,
                Classification::AmbiguousMultiple => s.ambiguous_multiple += 1,
                Classification::LowConfidence => s.low_confidence += 1,
                Classification::Unscorable => s.unscorable += 1,
            }
            if o.selected.is_some() && o.confidence < UNCERTAIN_BELOW {
                s.uncertain += 1;
            }
            if o.is_partial() {
                s.partial += 1;
            }
        }
        s
    }

    /// Questions that resolved to a selection.
    pub fn answered(&self) -> usize {
        self.selected + self.low_confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(classification: Classification, confidence: f32, selected: bool) -> QuestionOutcome {
        QuestionOutcome {
            question: 1,
            selected: selected.then(|| "A".to_string()),
            classification,
            confidence,
            scores: Vec::new(),
            unreachable: Vec::new(),
        }
    }

    #[test]
    fn counts_each_classification() {
        let outcomes = vec![
            outcome(Classification::Selected, 95.0, true),
            outcome(Classification::Selected, 65.0, true),
            outcome(Classification::LowConfidence, 55.0, true),
            outcome(Classification::Blank, 0.0, false),
            outcome(Classification::AmbiguousMultiple, 0.0, false),
        ];
        let s = DetectionStats::from_outcomes(&outcomes);
        assert_eq!(s.total, 5);
        assert_eq!(s.selected, 2);
        assert_eq!(s.low_confidence, 1);
        assert_eq!(s.blank, 1);
        assert_eq!(s.ambiguous_multiple, 1);
        assert_eq!(s.uncertain, 2);
        assert_eq!(s.answered(), 3);
    }
}
