//! Ordered strategy trials with a validation gate.
//!
//! Strategies run one at a time, most reliable first. A strategy either
//! yields a resolution that passes its gate, ending the run, or is abandoned
//! whole; results from different strategies are never mixed. When every
//! strategy fails, or the deadline passes, the run ends in
//! [`CalibrationRequired`].

use crate::strategy::{LocateError, LocateStrategy, StrategyContext, StrategyKind};
use crate::validation::{validate_regions, ValidationParams, ValidationSummary};
use bubblescan_anchors::Anchor;
use bubblescan_layout::{DroppedQuestion, QuestionRegions, Resolution};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorParams {
    pub validation: ValidationParams,
    /// Abandon the run once this many milliseconds have elapsed.
    pub deadline_ms: Option<u64>,
}

impl OrchestratorParams {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Accepted geometry for one sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub method: StrategyKind,
    /// Percent; the method's nominal accuracy scaled by validation quality.
    pub estimated_accuracy: f32,
    pub validation: ValidationSummary,
    pub questions: Vec<QuestionRegions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedQuestion>,
    pub px_per_mm: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anchors: Vec<Anchor>,
}

impl StrategyResult {
    pub fn new(
        method: StrategyKind,
        resolution: Resolution,
        validation: ValidationSummary,
        anchors: Vec<Anchor>,
    ) -> Self {
        let estimated_accuracy = match method {
            StrategyKind::ManualCalibration => 100.0,
            _ => (method.estimated_accuracy() * validation.quality).clamp(0.0, 100.0),
        };
        Self {
            method,
            estimated_accuracy,
            validation,
            questions: resolution.questions,
            dropped: resolution.dropped,
            px_per_mm: resolution.px_per_mm,
            anchors,
        }
    }

    pub fn region_count(&self) -> usize {
        self.questions.iter().map(|q| q.regions.len()).sum()
    }
}

/// What happened to one strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    NotApplicable { reason: String },
    AnchorsFailed { reason: String },
    Rejected { validation: ValidationSummary },
    Accepted { validation: ValidationSummary },
    /// Geometry arrived after the deadline and was discarded.
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: StrategyKind,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub elapsed_ms: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationReason {
    AllStrategiesFailed,
    Timeout,
}

/// Terminal state when no strategy produced trustworthy geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRequired {
    pub reason: CalibrationReason,
    pub attempts: Vec<StrategyAttempt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OrchestratorOutcome {
    Accepted {
        result: StrategyResult,
        attempts: Vec<StrategyAttempt>,
    },
    CalibrationRequired(CalibrationRequired),
}

impl OrchestratorOutcome {
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            Self::Accepted { attempts, .. } => attempts,
            Self::CalibrationRequired(c) => &c.attempts,
        }
    }

    pub fn accepted(&self) -> Option<&StrategyResult> {
        match self {
            Self::Accepted { result, .. } => Some(result),
            Self::CalibrationRequired(_) => None,
        }
    }
}

/// Observable orchestrator states, reported through `log`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Trying(StrategyKind),
    Validating(StrategyKind),
    Accepted(StrategyKind),
    CalibrationRequired(CalibrationReason),
}

pub struct StrategyOrchestrator {
    strategies: Vec<Box<dyn LocateStrategy>>,
    params: OrchestratorParams,
}

impl StrategyOrchestrator {
    /// Strategies are tried in rank order regardless of the order given.
    pub fn new(mut strategies: Vec<Box<dyn LocateStrategy>>, params: OrchestratorParams) -> Self {
        strategies.sort_by_key(|s| s.kind().rank());
        Self { strategies, params }
    }

    pub fn params(&self) -> &OrchestratorParams {
        &self.params
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip_all,
            fields(width = ctx.image.width, height = ctx.image.height, strategies = self.strategies.len())
        )
    )]
    pub fn run(&self, ctx: &StrategyContext<'_>) -> OrchestratorOutcome {
        let started = Instant::now();
        let deadline = self.params.deadline();
        let expired = || deadline.is_some_and(|d| started.elapsed() >= d);
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if expired() {
                return self.calibration_required(CalibrationReason::Timeout, attempts);
            }
            transition(OrchestratorState::Trying(kind));
            let t0 = Instant::now();
            let located = strategy.locate(ctx);
            let elapsed_ms = t0.elapsed().as_secs_f64() * 1e3;

            let located = match located {
                Ok(l) => l,
                Err(e) => {
                    log::info!("strategy {kind}: {e}");
                    let outcome = match e {
                        LocateError::NotApplicable(reason) => AttemptOutcome::NotApplicable {
                            reason: reason.to_string(),
                        },
                        other => AttemptOutcome::AnchorsFailed {
                            reason: other.to_string(),
                        },
                    };
                    attempts.push(StrategyAttempt {
                        strategy: kind,
                        outcome,
                        elapsed_ms,
                    });
                    continue;
                }
            };
            if expired() {
                attempts.push(StrategyAttempt {
                    strategy: kind,
                    outcome: AttemptOutcome::Abandoned,
                    elapsed_ms,
                });
                return self.calibration_required(CalibrationReason::Timeout, attempts);
            }

            transition(OrchestratorState::Validating(kind));
            let validation = validate_regions(
                &located.resolution,
                ctx.image.width,
                ctx.image.height,
                located.frame.as_ref(),
                &self.params.validation,
            );
            if !strategy.gate().passes(&validation, &self.params.validation) {
                log::info!(
                    "strategy {kind}: rejected (in bounds {:.2}, spacing violations {}, aspect error {:?})",
                    validation.in_bounds_fraction,
                    validation.spacing_violations,
                    validation.aspect_error
                );
                attempts.push(StrategyAttempt {
                    strategy: kind,
                    outcome: AttemptOutcome::Rejected { validation },
                    elapsed_ms,
                });
                continue;
            }

            transition(OrchestratorState::Accepted(kind));
            attempts.push(StrategyAttempt {
                strategy: kind,
                outcome: AttemptOutcome::Accepted {
                    validation: validation.clone(),
                },
                elapsed_ms,
            });
            let result = StrategyResult::new(kind, located.resolution, validation, located.anchors);
            return OrchestratorOutcome::Accepted { result, attempts };
        }

        self.calibration_required(CalibrationReason::AllStrategiesFailed, attempts)
    }

    fn calibration_required(
        &self,
        reason: CalibrationReason,
        attempts: Vec<StrategyAttempt>,
    ) -> OrchestratorOutcome {
        transition(OrchestratorState::CalibrationRequired(reason));
        OrchestratorOutcome::CalibrationRequired(CalibrationRequired { reason, attempts })
    }
}

fn transition(state: OrchestratorState) {
    match state {
        OrchestratorState::Trying(k) => log::debug!("trying {k}"),
        OrchestratorState::Validating(k) => log::debug!("validating {k}"),
        OrchestratorState::Accepted(k) => log::info!("accepted {k}"),
        OrchestratorState::CalibrationRequired(r) => log::warn!("calibration required: {r:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Located;
    use bubblescan_anchors::AnchorError;
    use bubblescan_core::GrayImage;
    use bubblescan_layout::{LayoutTemplate, Region};
    use nalgebra::Point2;
    use std::cell::Cell;
    use std::rc::Rc;

    fn template() -> LayoutTemplate {
        LayoutTemplate::from_json_str(
            r#"{ "page": { "width_mm": 100.0, "height_mm": 100.0 },
                 "option_radius_mm": 2.0,
                 "questions": { "1": { "options": [
                    { "label": "A", "x": 20.0, "y": 20.0 }, { "label": "B", "x": 30.0, "y": 20.0 } ] } } }"#,
        )
        .expect("template")
    }

    /// Scripted strategy: fails, or yields regions spaced `spacing` apart.
    struct Scripted {
        kind: StrategyKind,
        spacing: Option<f32>,
        calls: Rc<Cell<usize>>,
    }

    impl LocateStrategy for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn locate(&self, _ctx: &StrategyContext<'_>) -> Result<Located, LocateError> {
            self.calls.set(self.calls.get() + 1);
            let spacing = self.spacing.ok_or(LocateError::Anchors(AnchorError::FiducialsMissing {
                missing: bubblescan_anchors::AnchorRole::CORNERS.to_vec(),
            }))?;
            let regions = ["A", "B"]
                .iter()
                .enumerate()
                .map(|(i, l)| Region {
                    question: 1,
                    label: l.to_string(),
                    center: Point2::new(20.0 + i as f32 * spacing, 20.0),
                    radius: 4.0,
                })
                .collect();
            Ok(Located {
                resolution: Resolution {
                    questions: vec![QuestionRegions {
                        question: 1,
                        regions,
                    }],
                    dropped: Vec::new(),
                    px_per_mm: 1.0,
                },
                anchors: Vec::new(),
                frame: None,
            })
        }
    }

    fn scripted(kind: StrategyKind, spacing: Option<f32>) -> (Box<dyn LocateStrategy>, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        (
            Box::new(Scripted {
                kind,
                spacing,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn stops_at_first_valid_strategy_in_rank_order() {
        let t = template();
        let img = GrayImage::filled(100, 100, 255);
        let ctx = StrategyContext::new(img.view(), &t, None);
        let (grid, grid_calls) = scripted(StrategyKind::ProportionalGrid, Some(10.0));
        let (fid, fid_calls) = scripted(StrategyKind::Fiducials, Some(10.0));
        let (text, _) = scripted(StrategyKind::TextAnchors, None);

        let orch = StrategyOrchestrator::new(vec![grid, fid, text], OrchestratorParams::default());
        assert_eq!(
            orch.strategy_kinds(),
            vec![
                StrategyKind::TextAnchors,
                StrategyKind::Fiducials,
                StrategyKind::ProportionalGrid
            ]
        );
        let out = orch.run(&ctx);
        let result = out.accepted().expect("accepted");
        assert_eq!(result.method, StrategyKind::Fiducials);
        assert!((result.estimated_accuracy - 90.0).abs() < 1e-3);
        assert_eq!(fid_calls.get(), 1);
        assert_eq!(grid_calls.get(), 0);
        assert!(matches!(
            out.attempts()[0].outcome,
            AttemptOutcome::AnchorsFailed { .. }
        ));
    }

    #[test]
    fn collapsed_geometry_is_rejected_and_next_strategy_tried() {
        let t = template();
        let img = GrayImage::filled(100, 100, 255);
        let ctx = StrategyContext::new(img.view(), &t, None);
        let (fid, _) = scripted(StrategyKind::Fiducials, Some(0.5));
        let (pattern, _) = scripted(StrategyKind::InferredPattern, Some(12.0));
        let out = StrategyOrchestrator::new(vec![fid, pattern], OrchestratorParams::default()).run(&ctx);
        assert_eq!(out.accepted().map(|r| r.method), Some(StrategyKind::InferredPattern));
        assert!(matches!(out.attempts()[0].outcome, AttemptOutcome::Rejected { .. }));
    }

    #[test]
    fn exhausted_strategies_require_calibration() {
        let t = template();
        let img = GrayImage::filled(100, 100, 255);
        let ctx = StrategyContext::new(img.view(), &t, None);
        let (a, _) = scripted(StrategyKind::TextAnchors, None);
        let (b, _) = scripted(StrategyKind::Fiducials, None);
        let out = StrategyOrchestrator::new(vec![a, b], OrchestratorParams::default()).run(&ctx);
        match out {
            OrchestratorOutcome::CalibrationRequired(c) => {
                assert_eq!(c.reason, CalibrationReason::AllStrategiesFailed);
                assert_eq!(c.attempts.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_deadline_times_out_before_any_attempt() {
        let t = template();
        let img = GrayImage::filled(100, 100, 255);
        let ctx = StrategyContext::new(img.view(), &t, None);
        let (grid, calls) = scripted(StrategyKind::ProportionalGrid, Some(10.0));
        let params = OrchestratorParams {
            deadline_ms: Some(0),
            ..OrchestratorParams::default()
        };
        let out = StrategyOrchestrator::new(vec![grid], params).run(&ctx);
        assert_eq!(calls.get(), 0);
        assert!(matches!(
            out,
            OrchestratorOutcome::CalibrationRequired(CalibrationRequired {
                reason: CalibrationReason::Timeout,
                ..
            })
        ));
    }
}
