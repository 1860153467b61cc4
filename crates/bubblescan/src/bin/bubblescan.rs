//! bubblescan CLI: read answer sheets, inspect captures and templates.

use bubblescan::core::assess_quality;
use bubblescan::detect;
use bubblescan::marks::ThresholdPreset;
use bubblescan::{LayoutTemplate, SheetConfig, SheetOutcome, SheetReport, StrategyKind};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

/// Exit status when no strategy located the grid.
const EXIT_CALIBRATION_REQUIRED: u8 = 2;

#[derive(Parser)]
#[command(name = "bubblescan")]
#[command(about = "Read filled bubbles on photographed or scanned answer sheets")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one sheet and write a JSON report.
    Read(ReadArgs),

    /// Print capture-quality metrics of an image.
    Quality {
        /// Path to the input image.
        #[arg(long)]
        image: PathBuf,
    },

    /// Load a template and print what it contains.
    Template {
        /// Path to the template JSON.
        #[arg(long)]
        template: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct ReadArgs {
    /// JSON run configuration; other flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the sheet image.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Path to the template JSON.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Threshold preset: strict, balanced or lenient-photo.
    #[arg(long)]
    preset: Option<ThresholdPreset>,

    /// Restrict automatic strategies (comma separated, e.g. `fiducials,proportional-grid`).
    #[arg(long, value_delimiter = ',')]
    strategies: Vec<StrategyKind>,

    /// Recognized text tokens for the text-anchor strategy: a JSON array, or
    /// tesseract word output when the file ends in `.tsv`.
    #[arg(long)]
    tokens: Option<PathBuf>,

    /// Recognize question numbers with the `tesseract` executable.
    #[cfg(feature = "tesseract")]
    #[arg(long)]
    tesseract: bool,

    /// Manual calibration points (JSON); skips detection.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Where to write the report (default: bubblescan_report.json).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Give up on automatic location after this many milliseconds.
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Read(args) => run_read(&args),
        Commands::Quality { image } => run_quality(&image),
        Commands::Template { template } => run_template(&template),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(level: &str) -> CliResult<()> {
    tracing_log::LogTracer::init()?;
    bubblescan::core::init_tracing_with_level(bubblescan::core::parse_level(level), false);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: &str) -> CliResult<()> {
    bubblescan::core::init_with_level(bubblescan::core::parse_level(level))?;
    Ok(())
}

fn path_string(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

fn build_config(args: &ReadArgs) -> CliResult<SheetConfig> {
    let mut config = match &args.config {
        Some(path) => SheetConfig::load_json(path)?,
        None => {
            let (Some(image), Some(template)) = (&args.image, &args.template) else {
                return Err("either --config or both --image and --template are required".into());
            };
            SheetConfig::new(path_string(image), path_string(template))
        }
    };
    if let Some(image) = &args.image {
        config.image_path = path_string(image);
    }
    if let Some(template) = &args.template {
        config.template_path = path_string(template);
    }
    if let Some(preset) = args.preset {
        config.preset = preset;
    }
    if !args.strategies.is_empty() {
        config.strategies = Some(args.strategies.clone());
    }
    if let Some(tokens) = &args.tokens {
        config.tokens_path = Some(path_string(tokens));
    }
    #[cfg(feature = "tesseract")]
    if args.tesseract && config.tesseract.is_none() {
        config.tesseract = Some(bubblescan::TesseractParams::default());
    }
    if let Some(calibration) = &args.calibration {
        config.calibration_path = Some(path_string(calibration));
    }
    if let Some(out) = &args.out {
        config.output_path = Some(path_string(out));
    }
    if args.deadline_ms.is_some() {
        config.deadline_ms = args.deadline_ms;
    }
    Ok(config)
}

fn run_read(args: &ReadArgs) -> CliResult<ExitCode> {
    let config = build_config(args)?;
    let report = detect::run_config(&config)?;
    let out = config.output_path();
    report.write_json(&out)?;
    print_summary(&report);
    println!("report written to {}", out.display());

    Ok(match report.outcome {
        SheetOutcome::Read(_) => ExitCode::SUCCESS,
        SheetOutcome::CalibrationRequired { .. } => ExitCode::from(EXIT_CALIBRATION_REQUIRED),
    })
}

fn print_summary(report: &SheetReport) {
    match &report.outcome {
        SheetOutcome::Read(result) => {
            println!(
                "method {} (estimated accuracy {:.0}%)",
                result.strategy.method, result.strategy.estimated_accuracy
            );
            for outcome in &result.outcomes {
                let answer = outcome.selected.as_deref().unwrap_or("-");
                println!(
                    "  Q{:<4} {:<4} {:<18} {:5.1}",
                    outcome.question, answer, outcome.classification, outcome.confidence
                );
            }
            let s = &result.statistics;
            println!(
                "{} questions: {} answered, {} blank, {} ambiguous, {} low confidence, {} unscorable",
                s.total,
                s.answered(),
                s.blank,
                s.ambiguous_multiple,
                s.low_confidence,
                s.unscorable
            );
        }
        SheetOutcome::CalibrationRequired { required, .. } => {
            println!("calibration required ({:?})", required.reason);
            for attempt in &required.attempts {
                println!("  {}: {:?}", attempt.strategy, attempt.outcome);
            }
        }
    }
}

fn run_quality(image: &std::path::Path) -> CliResult<ExitCode> {
    let img = detect::load_gray(image)?;
    let quality = assess_quality(&detect::gray_view(&img));
    println!("{}", serde_json::to_string_pretty(&quality)?);
    Ok(ExitCode::SUCCESS)
}

fn run_template(path: &std::path::Path) -> CliResult<ExitCode> {
    let template = LayoutTemplate::load_json(path)?;
    let page = template.page();
    println!("template version {}", template.version());
    println!("page {} x {} mm", page.width_mm, page.height_mm);
    println!(
        "{} questions, {} options",
        template.questions().len(),
        template.option_count()
    );
    println!(
        "fiducials: {}, row anchors: {}, exact registration: {}",
        template.fiducials().is_some(),
        template.row_anchor().is_some(),
        template.exact_registration()
    );
    for issue in template.issues() {
        println!("skipped: {issue}");
    }
    Ok(ExitCode::SUCCESS)
}
