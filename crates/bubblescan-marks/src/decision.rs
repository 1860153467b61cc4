//! Per-question decision from the option scores of that question alone.
//!
//! Thresholds are relative within a question: the absolute darkness of a
//! photographed page varies with lighting, so only the blank floors are
//! absolute.

use crate::{QuestionScores, RegionScore};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionParams {
    /// Core fill (percent) under which an option counts as unmarked.
    pub blank_core_fill: f32,
    /// Combined score under which the best option counts as unmarked.
    pub blank_score: f32,
    /// Core fill a runner-up needs to count as a second real mark.
    pub real_mark_core_fill: f32,
    /// Score gap below which two real marks are ambiguous.
    pub multiple_marks_gap: f32,
    /// Score gap below which a selection is flagged low-confidence.
    pub low_confidence_gap: f32,
    /// Confidence band reported for low-confidence selections.
    pub low_confidence_min: f32,
    pub low_confidence_max: f32,
    /// Lower bound of the confidence reported for clear selections.
    pub high_confidence_min: f32,
    /// A runner-up scoring below this adds `weak_second_bonus`.
    pub weak_second_score: f32,
    pub weak_second_bonus: f32,
    /// Confidence multiplier for questions with a single reachable option.
    pub single_option_factor: f32,
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            blank_core_fill: 15.0,
            blank_score: 20.0,
            real_mark_core_fill: 40.0,
            multiple_marks_gap: 10.0,
            low_confidence_gap: 15.0,
            low_confidence_min: 50.0,
            low_confidence_max: 69.0,
            high_confidence_min: 70.0,
            weak_second_score: 30.0,
            weak_second_bonus: 10.0,
            single_option_factor: 1.2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Selected,
    Blank,
    AmbiguousMultiple,
    LowConfidence,
    /// No option of the question could be scored.
    Unscorable,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Selected => "selected",
            Self::Blank => "blank",
            Self::AmbiguousMultiple => "ambiguous-multiple",
            Self::LowConfidence => "low-confidence",
            Self::Unscorable => "unscorable",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question: u32,
    pub selected: Option<String>,
    pub classification: Classification,
    /// In `[0, 100]`, comparable only within this question.
    pub confidence: f32,
    /// Scores of the reachable options, in template order.
    pub scores: Vec<RegionScore>,
    /// Options excluded because their region could not be scored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreachable: Vec<String>,
}

impl QuestionOutcome {
    /// `(reachable, expected)` option counts.
    pub fn option_counts(&self) -> (usize, usize) {
        (self.scores.len(), self.scores.len() + self.unreachable.len())
    }

    pub fn is_partial(&self) -> bool {
        !self.unreachable.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct DecisionEngine {
    params: DecisionParams,
}

impl DecisionEngine {
    pub fn new(params: DecisionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DecisionParams {
        &self.params
    }

    pub fn decide_question(&self, scores: &QuestionScores) -> QuestionOutcome {
        let mut outcome = self.decide(scores.question, &scores.scores);
        outcome.unreachable = scores.unreachable.clone();
        outcome
    }

    /// Decide one question from the scores of its reachable options.
    pub fn decide(&self, question: u32, scores: &[RegionScore]) -> QuestionOutcome {
        let (selected, classification, confidence) = self.classify(scores);
        log::debug!("question {question}: {classification} ({confidence:.1})");
        QuestionOutcome {
            question,
            selected,
            classification,
            confidence: confidence.clamp(0.0, 100.0),
            scores: scores.to_vec(),
            unreachable: Vec::new(),
        }
    }

    fn classify(&self, scores: &[RegionScore]) -> (Option<String>, Classification, f32) {
        let p = &self.params;
        let mut ranked: Vec<&RegionScore> = scores.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let Some(first) = ranked.first() else {
            return (None, Classification::Unscorable, 0.0);
        };
        let all_below_floor = ranked.iter().all(|s| s.core_fill < p.blank_core_fill);
        if all_below_floor || (first.core_fill < p.blank_core_fill && first.score < p.blank_score) {
            return (None, Classification::Blank, 0.0);
        }

        let Some(second) = ranked.get(1) else {
            return (
                Some(first.label.clone()),
                Classification::Selected,
                first.score * p.single_option_factor,
            );
        };

        let gap = first.score - second.score;
        if gap <= 0.0 || (second.core_fill >= p.real_mark_core_fill && gap < p.multiple_marks_gap) {
            return (None, Classification::AmbiguousMultiple, 0.0);
        }
        if gap < p.low_confidence_gap {
            let t = gap / p.low_confidence_gap;
            let confidence = p.low_confidence_min + t * (p.low_confidence_max - p.low_confidence_min);
            return (Some(first.label.clone()), Classification::LowConfidence, confidence);
        }

        let mut confidence = first.score + 0.5 * gap;
        if second.score < p.weak_second_score {
            confidence += p.weak_second_bonus;
        }
        (
            Some(first.label.clone()),
            Classification::Selected,
            confidence.clamp(p.high_confidence_min, 100.0),
        )
    }
}
