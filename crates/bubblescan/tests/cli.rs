mod common;

use assert_cmd::Command;
use bubblescan::{SheetOutcome, SheetReport, StrategyKind};
use common::{template_json, to_image, SheetSpec, TemplateOptions};
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new(opts: TemplateOptions, sheet: &SheetSpec) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("template.json"), template_json(opts)).expect("template");
        to_image(&sheet.render())
            .save(dir.path().join("sheet.png"))
            .expect("png");
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn read_cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("bubblescan").expect("binary");
        cmd.arg("read")
            .arg("--image")
            .arg(self.path("sheet.png"))
            .arg("--template")
            .arg(self.path("template.json"))
            .arg("--out")
            .arg(self.path("report.json"))
            .args(["--log-level", "warn"]);
        cmd
    }

    fn report(&self) -> SheetReport {
        SheetReport::load_json(self.path("report.json")).expect("report")
    }
}

fn fiducial_template() -> TemplateOptions {
    TemplateOptions {
        fiducials: true,
        ..Default::default()
    }
}

#[test]
fn read_writes_report_and_prints_answers() {
    let fx = Fixture::new(fiducial_template(), &SheetSpec::answered(true));
    fx.read_cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("method fiducials"))
        .stdout(predicate::str::contains("ambiguous-multiple"));

    let report = fx.report();
    assert_eq!(report.template_version, "test-1");
    let SheetOutcome::Read(result) = report.outcome else {
        panic!("expected a read sheet");
    };
    assert_eq!(result.strategy.method, StrategyKind::Fiducials);
    assert_eq!(
        result.outcome(2).and_then(|o| o.selected.as_deref()),
        Some("C")
    );
}

#[test]
fn calibration_request_exits_with_code_two() {
    let fx = Fixture::new(fiducial_template(), &SheetSpec::answered(false));
    fx.read_cmd()
        .args(["--strategies", "fiducials"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("calibration required"));
    assert!(matches!(
        fx.report().outcome,
        SheetOutcome::CalibrationRequired { .. }
    ));
}

#[test]
fn calibration_file_is_applied() {
    let sheet = SheetSpec::answered(false);
    let fx = Fixture::new(TemplateOptions::default(), &sheet);
    let points = serde_json::to_string(&sheet.calibration()).expect("json");
    fs::write(fx.path("points.json"), points).expect("points");

    fx.read_cmd()
        .arg("--calibration")
        .arg(fx.path("points.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("method manual-calibration"));
}

#[test]
fn config_file_drives_a_run() {
    let sheet = SheetSpec::answered(false);
    let fx = Fixture::new(
        TemplateOptions {
            row_anchor: true,
            ..Default::default()
        },
        &sheet,
    );
    let tokens = serde_json::to_string(&sheet.tokens(common::QUESTIONS)).expect("json");
    fs::write(fx.path("tokens.json"), tokens).expect("tokens");
    let config = serde_json::json!({
        "image_path": path_str(&fx.path("sheet.png")),
        "template_path": path_str(&fx.path("template.json")),
        "tokens_path": path_str(&fx.path("tokens.json")),
        "output_path": path_str(&fx.path("report.json")),
        "preset": "strict",
        "strategies": ["text-anchors"],
    });
    fs::write(fx.path("run.json"), config.to_string()).expect("config");

    Command::cargo_bin("bubblescan")
        .expect("binary")
        .arg("read")
        .arg("--config")
        .arg(fx.path("run.json"))
        .assert()
        .success();
    let report = fx.report();
    assert_eq!(report.preset, bubblescan::ThresholdPreset::Strict);
    let result = report.outcome.result().expect("read");
    assert_eq!(result.strategy.method, StrategyKind::TextAnchors);
}

#[test]
fn tesseract_words_drive_text_anchors() {
    let sheet = SheetSpec::answered(false);
    let fx = Fixture::new(
        TemplateOptions {
            row_anchor: true,
            ..Default::default()
        },
        &sheet,
    );
    let mut tsv = String::from("level\tpage_num\tleft\ttop\twidth\theight\tconf\ttext\n");
    tsv.push_str("1\t1\t0\t0\t420\t592\t-1\t\n");
    for t in sheet.tokens(common::QUESTIONS).0 {
        let b = t.bbox;
        tsv.push_str(&format!(
            "5\t1\t{}\t{}\t{}\t{}\t{}\t{}\n",
            b.x, b.y, b.width, b.height, t.confidence, t.text
        ));
    }
    fs::write(fx.path("words.tsv"), tsv).expect("tsv");

    fx.read_cmd()
        .arg("--tokens")
        .arg(fx.path("words.tsv"))
        .args(["--strategies", "text-anchors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("method text-anchors"));
    let report = fx.report();
    let result = report.outcome.result().expect("read");
    assert_eq!(result.strategy.method, StrategyKind::TextAnchors);
    assert_eq!(result.strategy.anchors.len(), common::QUESTIONS as usize);
}

#[test]
fn log_level_flag_controls_stderr() {
    let fx = Fixture::new(fiducial_template(), &SheetSpec::answered(true));
    let run = |level: &str| {
        let mut cmd = Command::cargo_bin("bubblescan").expect("binary");
        cmd.env_remove("RUST_LOG")
            .arg("read")
            .arg("--image")
            .arg(fx.path("sheet.png"))
            .arg("--template")
            .arg(fx.path("template.json"))
            .arg("--out")
            .arg(fx.path("report.json"))
            .args(["--log-level", level]);
        cmd
    };
    run("debug")
        .assert()
        .success()
        .stderr(predicate::str::contains("trying fiducials"));
    run("off").assert().success().stderr(predicate::str::is_empty());
}

#[test]
fn read_needs_image_and_template() {
    Command::cargo_bin("bubblescan")
        .expect("binary")
        .arg("read")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--config"));
}

#[test]
fn template_command_summarizes_layout() {
    let fx = Fixture::new(fiducial_template(), &SheetSpec::answered(true));
    Command::cargo_bin("bubblescan")
        .expect("binary")
        .arg("template")
        .arg("--template")
        .arg(fx.path("template.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("10 questions, 40 options"))
        .stdout(predicate::str::contains("fiducials: true"));
}

#[test]
fn quality_command_prints_metrics() {
    let fx = Fixture::new(fiducial_template(), &SheetSpec::answered(true));
    Command::cargo_bin("bubblescan")
        .expect("binary")
        .arg("quality")
        .arg("--image")
        .arg(fx.path("sheet.png"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"overall\""));
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
