//! Background removal CLI tool
//!
//! Runs one image through the pipeline with the reference border-key remover
//! and writes the final (and optionally the preprocessed) image.

use super::config::{CliConfigBuilder, CliRunConfig};
use crate::{
    backends::BorderKeyRemover,
    config::OutputFormat,
    services::{OutputFormatHandler, TracingProgressReporter},
    tracing_config::init_cli_tracing,
    remove_background_from_reader,
    types::EncodedOutputs,
    Pipeline,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::debug;

/// Marker for reading from stdin / writing to stdout
const STDIO: &str = "-";

/// Remove the background from an image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-pipeline")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image file (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Output file or directory (use "-" for stdout) [default: processed_<name> next to the input]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Also write the preprocessed (resized and enhanced) image as PNG
    #[arg(long, value_name = "PATH")]
    pub preprocessed_output: Option<String>,

    /// Background color: "transparent", #RRGGBB or #RRGGBBAA (alpha 00 = transparent)
    #[arg(long, value_name = "COLOR")]
    pub bg_color: Option<String>,

    /// Disable alpha matting (hard cut-out edges)
    #[arg(long)]
    pub no_alpha_matting: bool,

    /// Foreground threshold for alpha matting (0-255)
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub fg_threshold: Option<i64>,

    /// Background threshold for alpha matting (0-255)
    #[arg(long, value_name = "VALUE", allow_negative_numbers = true)]
    pub bg_threshold: Option<i64>,

    /// Sharpen the image before background removal
    #[arg(long)]
    pub sharpen: bool,

    /// Boost contrast before background removal
    #[arg(long)]
    pub contrast: bool,

    /// Longer image side after resizing, in pixels [default: 2500]
    #[arg(long, value_name = "PIXELS")]
    pub max_dimension: Option<u32>,

    /// Largest accepted input, in MiB [default: 15]
    #[arg(long, value_name = "MB")]
    pub max_size_mb: Option<u64>,

    /// Give up on background removal after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    /// JPEG quality (1-100) for results with a solid background [default: 90]
    #[arg(long, value_name = "QUALITY")]
    pub jpeg_quality: Option<u8>,

    /// Processing options as a JSON file or inline JSON object; flags override it
    #[arg(long, value_name = "JSON")]
    pub options: Option<String>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE, -vvv: everything)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines (requires the `tracing-json` feature)
    #[arg(long)]
    pub json_logs: bool,
}

/// Where an encoded image goes
#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    Stdout,
    File(PathBuf),
}

/// Main CLI entry point
///
/// # Errors
/// - Invalid arguments or options
/// - Unreadable input, pipeline failures, unwritable outputs
pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let CliRunConfig {
        processing,
        settings,
    } = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    debug!(?processing, ?settings, "resolved configuration");

    let pipeline = Pipeline::builder(Arc::new(BorderKeyRemover::new()))
        .settings(settings)
        .progress_reporter(Arc::new(TracingProgressReporter::new(cli.verbose > 0)))
        .build()
        .context("Failed to create pipeline")?;

    let reader = open_input(&cli.input).await?;
    info!("Reading image from {}", input_label(&cli.input));

    let spinner = create_spinner(&cli);
    if let Some(ref pb) = spinner {
        pb.set_message(format!("Removing background from {}", input_label(&cli.input)));
    }

    let outcome = remove_background_from_reader(&pipeline, reader, processing).await;
    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            if let Some(pb) = spinner {
                pb.abandon_with_message("Failed");
            }
            return Err(e).context("Failed to remove background");
        },
    };

    let outputs = pipeline.encode(&result).context("Failed to encode results")?;

    let target = resolve_output_target(&cli, outputs.final_format)?;
    write_outputs(&cli, &target, &outputs).await?;

    let timings = &result.metadata.timings;
    if let Some(pb) = spinner {
        pb.finish_with_message(format!(
            "Done in {:.2}s ({})",
            timings.total.as_secs_f64(),
            timings.summary()
        ));
    }

    info!(
        "Processed {} ({}x{} -> {}) in {:.2}s",
        input_label(&cli.input),
        result.metadata.original_dimensions.0,
        result.metadata.original_dimensions.1,
        result.final_image.describe(),
        timings.total.as_secs_f64()
    );

    Ok(())
}

/// Spinner on stderr, hidden when logs or image data would interleave with it
fn create_spinner(cli: &Cli) -> Option<ProgressBar> {
    if cli.json_logs || cli.output.as_deref() == Some(STDIO) || cli.input == STDIO {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn input_label(input: &str) -> &str {
    if input == STDIO {
        "stdin"
    } else {
        input
    }
}

/// Open the input for a bounded read; the pipeline stops one byte past its limit
async fn open_input(input: &str) -> Result<Box<dyn AsyncRead + Unpin + Send>> {
    if input == STDIO {
        return Ok(Box::new(tokio::io::stdin()));
    }

    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to read input file: {}", input))?;
    Ok(Box::new(file))
}

fn write_stdout(data: &[u8]) -> Result<()> {
    io::stdout()
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    io::stdout().flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Decide where the final image is written
///
/// A directory (existing, or given with a trailing separator) or a missing
/// `--output` gets the download name `processed_<stem>.<ext>`; without
/// `--output` the file lands next to the input.
fn resolve_output_target(cli: &Cli, format: OutputFormat) -> Result<OutputTarget> {
    let input_name = if cli.input == STDIO { "image" } else { cli.input.as_str() };
    let download_name = OutputFormatHandler::download_file_name(input_name, format);

    match cli.output.as_deref() {
        Some(STDIO) => Ok(OutputTarget::Stdout),
        Some(output) => {
            let path = PathBuf::from(output);
            if path.is_dir() || output.ends_with(std::path::MAIN_SEPARATOR) || output.ends_with('/') {
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory: {}", path.display())
                })?;
                Ok(OutputTarget::File(path.join(download_name)))
            } else {
                OutputFormatHandler::warn_on_extension_mismatch(&path, format);
                Ok(OutputTarget::File(path))
            }
        },
        None if cli.input == STDIO => Ok(OutputTarget::Stdout),
        None => {
            let dir = Path::new(&cli.input).parent().unwrap_or(Path::new("."));
            Ok(OutputTarget::File(dir.join(download_name)))
        },
    }
}

async fn write_outputs(cli: &Cli, target: &OutputTarget, outputs: &EncodedOutputs) -> Result<()> {
    match target {
        OutputTarget::Stdout => {
            write_stdout(&outputs.final_bytes)?;
            info!("{} image written to stdout", outputs.final_format);
        },
        OutputTarget::File(path) => {
            tokio::fs::write(path, &outputs.final_bytes)
                .await
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            info!("{} image saved to: {}", outputs.final_format, path.display());
        },
    }

    if let Some(ref preprocessed) = cli.preprocessed_output {
        let path = Path::new(preprocessed);
        OutputFormatHandler::warn_on_extension_mismatch(path, OutputFormat::Png);
        tokio::fs::write(path, &outputs.preprocessed_png)
            .await
            .with_context(|| {
                format!("Failed to write preprocessed image: {}", path.display())
            })?;
        info!("Preprocessed image saved to: {}", path.display());
    }

    Ok(())
}
