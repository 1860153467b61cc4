//! End-to-end reading of one sheet image.

use crate::calibration::{CalibrationError, ManualCalibration};
use crate::orchestrator::{
    CalibrationRequired, OrchestratorOutcome, OrchestratorParams, StrategyAttempt,
    StrategyOrchestrator, StrategyResult,
};
use crate::strategy::{
    FiducialStrategy, LocateStrategy, PatternStrategy, ProportionalGridStrategy,
    RegistrationStrategy, StrategyContext, StrategyKind, TextAnchorStrategy,
};
use bubblescan_anchors::{
    FiducialDetector, FiducialParams, PatternDetector, PatternParams, TextAnchorDetector,
    TextAnchorParams, TextRecognizer,
};
use bubblescan_core::{assess_quality, GrayImageView, PhotoQuality};
use bubblescan_layout::{LayoutTemplate, TemplateIssue};
use bubblescan_marks::{
    Classification, DecisionEngine, DetectionStats, MarkConfig, MarkScorer, QuestionOutcome,
    ThresholdPreset,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Every tunable of a [`SheetReader`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetReaderParams {
    pub fiducial: FiducialParams,
    pub text: TextAnchorParams,
    pub pattern: PatternParams,
    pub marks: MarkConfig,
    pub orchestrator: OrchestratorParams,
    /// Automatic strategies to try. Order does not matter; they always run
    /// by reliability rank.
    pub strategies: Vec<StrategyKind>,
}

impl Default for SheetReaderParams {
    fn default() -> Self {
        Self {
            fiducial: FiducialParams::default(),
            text: TextAnchorParams::default(),
            pattern: PatternParams::default(),
            marks: MarkConfig::default(),
            orchestrator: OrchestratorParams::default(),
            strategies: StrategyKind::AUTOMATIC.to_vec(),
        }
    }
}

impl SheetReaderParams {
    pub fn preset(preset: ThresholdPreset) -> Self {
        Self {
            marks: MarkConfig::preset(preset),
            ..Self::default()
        }
    }
}

/// A sheet whose geometry was accepted and whose marks were decided.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetResult {
    /// One outcome per template question, in question order.
    pub outcomes: Vec<QuestionOutcome>,
    pub strategy: StrategyResult,
    pub attempts: Vec<StrategyAttempt>,
    pub statistics: DetectionStats,
    pub quality: PhotoQuality,
    /// Template entries that were skipped at load time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_issues: Vec<TemplateIssue>,
}

impl SheetResult {
    pub fn outcome(&self, question: u32) -> Option<&QuestionOutcome> {
        self.outcomes.iter().find(|o| o.question == question)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetOutcome {
    Read(SheetResult),
    CalibrationRequired {
        #[serde(flatten)]
        required: CalibrationRequired,
        quality: PhotoQuality,
    },
}

impl SheetOutcome {
    pub fn result(&self) -> Option<&SheetResult> {
        match self {
            Self::Read(r) => Some(r),
            Self::CalibrationRequired { .. } => None,
        }
    }
}

/// Reads sheets printed from one template. Holds no per-image state, so a
/// single reader can serve many images.
pub struct SheetReader {
    template: LayoutTemplate,
    params: SheetReaderParams,
    orchestrator: StrategyOrchestrator,
    scorer: MarkScorer,
    decision: DecisionEngine,
}

impl SheetReader {
    pub fn new(template: LayoutTemplate, params: SheetReaderParams) -> Self {
        let strategies = params
            .strategies
            .iter()
            .filter_map(|&kind| build_strategy(kind, &params))
            .collect();
        let orchestrator = StrategyOrchestrator::new(strategies, params.orchestrator.clone());
        Self {
            scorer: MarkScorer::new(params.marks.scoring.clone()),
            decision: DecisionEngine::new(params.marks.decision.clone()),
            template,
            params,
            orchestrator,
        }
    }

    pub fn template(&self) -> &LayoutTemplate {
        &self.template
    }

    pub fn params(&self) -> &SheetReaderParams {
        &self.params
    }

    /// Read one sheet.
    ///
    /// With `calibration`, detection is skipped and the manual fit is used;
    /// an invalid point set is the only error. Otherwise automatic strategies
    /// run and may end in [`SheetOutcome::CalibrationRequired`].
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width, height = image.height))
    )]
    pub fn read(
        &self,
        image: &GrayImageView<'_>,
        recognizer: Option<&dyn TextRecognizer>,
        calibration: Option<&ManualCalibration>,
    ) -> Result<SheetOutcome, CalibrationError> {
        let quality = assess_quality(image);
        log::debug!("capture quality {:.1} ({:?})", quality.overall, quality.level);

        let (strategy, attempts) = match calibration {
            Some(cal) => {
                let result = cal.fit(
                    &self.template,
                    image.width,
                    image.height,
                    &self.params.orchestrator.validation,
                )?;
                (result, Vec::new())
            }
            None => {
                let ctx = StrategyContext::new(*image, &self.template, recognizer);
                match self.orchestrator.run(&ctx) {
                    OrchestratorOutcome::Accepted { result, attempts } => (result, attempts),
                    OrchestratorOutcome::CalibrationRequired(required) => {
                        return Ok(SheetOutcome::CalibrationRequired { required, quality });
                    }
                }
            }
        };

        let outcomes = self.decide(image, &strategy);
        let statistics = DetectionStats::from_outcomes(&outcomes);
        log::info!(
            "{}: {} questions, {} answered, {} blank, {} ambiguous",
            strategy.method,
            statistics.total,
            statistics.answered(),
            statistics.blank,
            statistics.ambiguous_multiple
        );
        Ok(SheetOutcome::Read(SheetResult {
            outcomes,
            strategy,
            attempts,
            statistics,
            quality,
            template_issues: self.template.issues().to_vec(),
        }))
    }

    /// Score and decide every resolved question. Dropped questions are
    /// reported as unscorable, never as blank.
    fn decide(&self, image: &GrayImageView<'_>, strategy: &StrategyResult) -> Vec<QuestionOutcome> {
        let mut outcomes: Vec<QuestionOutcome> = self
            .scorer
            .score_sheet(image, &strategy.questions)
            .iter()
            .map(|q| self.decision.decide_question(q))
            .collect();

        for dropped in &strategy.dropped {
            let unreachable = self
                .template
                .question(dropped.question)
                .map(|q| q.options.iter().map(|o| o.label.clone()).collect())
                .unwrap_or_default();
            outcomes.push(QuestionOutcome {
                question: dropped.question,
                selected: None,
                classification: Classification::Unscorable,
                confidence: 0.0,
                scores: Vec::new(),
                unreachable,
            });
        }
        outcomes.sort_by_key(|o| o.question);
        outcomes
    }
}

fn build_strategy(kind: StrategyKind, params: &SheetReaderParams) -> Option<Box<dyn LocateStrategy>> {
    let fiducial = || FiducialDetector::new(params.fiducial.clone());
    let strategy: Box<dyn LocateStrategy> = match kind {
        StrategyKind::ManualCalibration => return None,
        StrategyKind::Registration => Box::new(RegistrationStrategy {
            detector: fiducial(),
        }),
        StrategyKind::TextAnchors => Box::new(TextAnchorStrategy {
            detector: TextAnchorDetector::new(params.text.clone()),
        }),
        StrategyKind::Fiducials => Box::new(FiducialStrategy {
            detector: fiducial(),
        }),
        StrategyKind::InferredPattern => Box::new(PatternStrategy {
            detector: PatternDetector::new(params.pattern.clone()),
        }),
        StrategyKind::ProportionalGrid => Box::new(ProportionalGridStrategy),
    };
    Some(strategy)
}
