use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use manimate::error_codes::{find_coded_error, CodedError, ErrorCode};
use manimate::errors::{build_error_report, ErrorKind, ErrorReport};
use manimate::fallback::fallback_scene;
use manimate::generator::CodeOrigin;
use manimate::llm::GroqClient;
use manimate::metrics::Metrics;
use manimate::performance::{
    analyze_complexity, estimate_render_seconds, estimate_scene_seconds, estimated_file_size,
    optimization_tips,
};
use manimate::pipeline::{GenerationOutcome, GenerationRequest, Pipeline, RunOptions};
use manimate::render::RenderFailure;
use manimate::repair::repair_code;
use manimate::settings::{QualityTier, Settings, API_KEY_ENV};
use manimate::validator::{scene_classes, validate};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "manimate", version)]
#[command(about = "Generate Manim animations from a text prompt")]
struct Cli {
    /// YAML settings file (defaults to $MANIMATE_CONFIG).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    #[arg(long = "verbose", global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Enhance the prompt, generate a scene and render it.
    Generate {
        prompt: String,
        #[arg(long = "model")]
        model: Option<String>,
        #[arg(long = "quality", value_enum)]
        quality: Option<QualityTier>,
        #[arg(short = 'o', long = "output", default_value = "./manimate-output")]
        output: PathBuf,
        #[arg(long = "skip-enhance", default_value_t = false)]
        skip_enhance: bool,
        #[arg(long = "skip-render", default_value_t = false)]
        skip_render: bool,
        #[arg(long = "clamp-timing", default_value_t = false)]
        clamp_timing: bool,
        /// Write the metrics summary for this run as JSON.
        #[arg(long = "metrics-out")]
        metrics_out: Option<PathBuf>,
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// Validate a scene file, optionally repairing it first.
    Check {
        file: PathBuf,
        #[arg(long = "repair", default_value_t = false)]
        repair: bool,
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// Print the fallback scene chosen for a prompt.
    Fallback { prompt: String },
    /// Classify an error message and print guidance.
    Classify {
        text: String,
        /// Scene file the error came from, for debug info.
        #[arg(long = "code")]
        code: Option<PathBuf>,
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// List models and quality tiers.
    Options {
        #[arg(long = "json", default_value_t = false)]
        json: bool,
    },
    /// Estimate render time and output size for a scene file.
    Estimate {
        file: PathBuf,
        #[arg(long = "quality", value_enum)]
        quality: Option<QualityTier>,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Self::Generate { json, .. }
            | Self::Check { json, .. }
            | Self::Classify { json, .. }
            | Self::Options { json } => *json,
            Self::Fallback { .. } | Self::Estimate { .. } => false,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let json = cli.command.json();

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            report_error(&error, json);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(cli.config.as_deref())
        .map_err(|error| CodedError::new(ErrorCode::InvalidConfig, format!("{error:#}")))?;
    init_tracing(&settings, cli.verbose);
    for issue in settings.validate() {
        tracing::warn!(%issue, "configuration issue");
    }

    match cli.command {
        Commands::Generate {
            prompt,
            model,
            quality,
            output,
            skip_enhance,
            skip_render,
            clamp_timing,
            metrics_out,
            json,
        } => {
            let request = GenerationRequest {
                prompt,
                model,
                quality,
            };
            let options = RunOptions {
                output_dir: output,
                skip_enhance,
                skip_render,
                clamp_timing,
            };
            run_generate(settings, &request, &options, metrics_out.as_deref(), json).await
        }
        Commands::Check { file, repair, json } => run_check(&file, repair, json),
        Commands::Fallback { prompt } => {
            let (shape, code) = fallback_scene(&prompt);
            tracing::info!(%shape, "selected fallback template");
            println!("{code}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Classify { text, code, json } => run_classify(&text, code.as_deref(), json),
        Commands::Options { json } => run_options(&settings, json),
        Commands::Estimate { file, quality } => {
            run_estimate(&file, quality.unwrap_or(settings.default_quality))
        }
    }
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let level = if verbose { "debug" } else { settings.log_level.as_str() };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("manimate={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn report_error(error: &anyhow::Error, json: bool) {
    match find_coded_error(error) {
        Some(coded) if json => match serde_json::to_string_pretty(&coded.envelope()) {
            Ok(encoded) => println!("{encoded}"),
            Err(_) => eprintln!("error: {error:#}"),
        },
        Some(coded) => {
            let label = if coded.code.is_usage() { "usage error" } else { "error" };
            eprintln!("{label}[{}]: {}", coded.code, coded.message);
        }
        None => eprintln!("error: {error:#}"),
    }
}

async fn run_generate(
    settings: Settings,
    request: &GenerationRequest,
    options: &RunOptions,
    metrics_out: Option<&Path>,
    json: bool,
) -> Result<ExitCode> {
    let api_key = env::var(API_KEY_ENV).map_err(|_| {
        CodedError::new(
            ErrorCode::MissingApiKey,
            format!("{API_KEY_ENV} is required to call the language model"),
        )
    })?;
    let http = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to create HTTP client")?;
    let client = GroqClient::new(http, api_key, &settings.api_base_url)
        .with_context(|| format!("invalid api_base_url '{}'", settings.api_base_url))?;

    let pipeline = Pipeline::new(settings, client);
    let mut metrics = Metrics::new();
    let outcome = pipeline.run(request, options, &mut metrics).await?;

    if let Some(path) = metrics_out {
        metrics.export(path)?;
    }

    let report = failure_report(&outcome);
    if json {
        let document = json!({
            "ok": outcome.succeeded(),
            "outcome": outcome,
            "error": report,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print_outcome(&outcome, report.as_ref());
    }

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn failure_report(outcome: &GenerationOutcome) -> Option<ErrorReport> {
    let render = outcome.render.as_ref().filter(|render| !render.success)?;
    let kind = match render.failure {
        Some(RenderFailure::TimeoutError) => ErrorKind::Timeout,
        _ => ErrorKind::Rendering,
    };
    let text = if render.message.trim().is_empty() {
        &render.logs
    } else {
        &render.message
    };
    Some(build_error_report(Some(kind), text, Some(&outcome.code)))
}

fn print_outcome(outcome: &GenerationOutcome, report: Option<&ErrorReport>) {
    println!("Model: {} ({})", outcome.model, outcome.quality);
    println!("Code origin: {}", describe_origin(outcome));
    println!("Scene: {}", outcome.code_path.display());
    if outcome.recommended_quality != outcome.quality {
        println!("Hint: {} is recommended for this prompt", outcome.recommended_quality);
    }
    match (&outcome.render, &outcome.output_path) {
        (None, _) => println!("Render: skipped"),
        (Some(render), Some(path)) if render.success => {
            println!("Render: ok in {} ms", render.elapsed_ms);
            println!("Video: {}", path.display());
        }
        (Some(render), _) => {
            println!("Render: failed ({})", render.message);
            if let Some(report) = report {
                println!("{}", report.user_message);
                println!("Likely cause: {} {}", report.summary, report.solution);
                for suggestion in &report.suggestions {
                    println!("  - {suggestion}");
                }
            }
        }
    }
}

fn describe_origin(outcome: &GenerationOutcome) -> String {
    match outcome.origin {
        CodeOrigin::Model { attempt } => format!("model (attempt {attempt})"),
        CodeOrigin::Fallback { shape } => format!("fallback template ({shape})"),
    }
}

fn read_scene(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn run_check(path: &Path, repair: bool, json: bool) -> Result<ExitCode> {
    let original = read_scene(path)?;
    let code = if repair {
        repair_code(&original)
    } else {
        original
    };
    let verdict = validate(&code);
    let classes = scene_classes(&code).unwrap_or_default();

    if json {
        let document = json!({
            "ok": verdict.is_ok(),
            "file": path.display().to_string(),
            "violation": verdict.as_ref().err(),
            "scene_classes": classes,
            "code": if repair { Some(&code) } else { None },
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        match &verdict {
            Ok(()) => println!("OK: {}", path.display()),
            Err(violation) => println!("INVALID: {}: {violation}", path.display()),
        }
        for class in &classes {
            let construct = if class.has_construct {
                "defines construct"
            } else {
                "missing construct"
            };
            println!("Scene class: {} ({construct})", class.name);
        }
        if repair {
            println!("\n{code}");
        }
    }

    Ok(if verdict.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_classify(text: &str, code_path: Option<&Path>, json: bool) -> Result<ExitCode> {
    let code = code_path.map(read_scene).transpose()?;
    let report = build_error_report(None, text, code.as_deref());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{} (severity: {:?}, recoverable: {})",
        report.error_class, report.severity, report.recoverable
    );
    println!("{}", report.summary);
    println!("Solution: {}", report.solution);
    println!("{}", report.user_message);
    for suggestion in &report.suggestions {
        println!("  - {suggestion}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_options(settings: &Settings, json: bool) -> Result<ExitCode> {
    let qualities = QualityTier::ALL
        .into_iter()
        .map(|tier| (tier, settings.quality(tier)))
        .collect::<Vec<_>>();

    if json {
        let document = json!({
            "build": option_env!("MANIMATE_GIT_HASH"),
            "default_model": settings.default_model,
            "default_quality": settings.default_quality,
            "models": settings.models,
            "qualities": qualities
                .iter()
                .map(|(tier, profile)| json!({"id": tier, "profile": profile}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Models:");
    for model in &settings.models {
        let marker = if model.id == settings.default_model { "*" } else { " " };
        println!("{marker} {:<26} {}", model.id, model.display_label());
    }
    println!("Quality tiers:");
    for (tier, profile) in &qualities {
        let marker = if *tier == settings.default_quality { "*" } else { " " };
        println!(
            "{marker} {:<20} {} {:<6} ~{} s  {}",
            tier, profile.flag, profile.resolution, profile.estimated_seconds, profile.description
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn run_estimate(path: &Path, quality: QualityTier) -> Result<ExitCode> {
    let code = read_scene(path)?;
    let complexity = analyze_complexity(&code);
    let scene_seconds = estimate_scene_seconds(&code);

    println!("Scene: {}", path.display());
    println!("Complexity: {complexity}");
    println!("Quality: {quality}");
    println!(
        "Estimated render time: ~{} s",
        estimate_render_seconds(quality, complexity)
    );
    println!(
        "Estimated video: {scene_seconds:.1} s, {}",
        estimated_file_size(quality, scene_seconds)
    );
    println!("Tips:");
    for tip in optimization_tips(quality, complexity) {
        println!("  - {tip}");
    }
    Ok(ExitCode::SUCCESS)
}
