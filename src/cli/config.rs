//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{BackgroundColor, PipelineSettings, ProcessingConfig, ProcessingConfigBuilder};
use anyhow::{Context, Result};
use std::time::Duration;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Everything a CLI run needs from its arguments
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CliRunConfig {
    pub(crate) processing: ProcessingConfig,
    pub(crate) settings: PipelineSettings,
}

/// Convert CLI arguments to pipeline configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build both configurations from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<CliRunConfig> {
        Ok(CliRunConfig {
            processing: Self::processing_config(cli)?,
            settings: Self::pipeline_settings(cli)?,
        })
    }

    /// Per-request options: `--options` first, then individual flags on top
    pub(crate) fn processing_config(cli: &Cli) -> Result<ProcessingConfig> {
        let base = match &cli.options {
            Some(options) => Self::load_options(options)?,
            None => ProcessingConfig::default(),
        };

        let mut builder = ProcessingConfigBuilder::from(base);

        if cli.no_alpha_matting {
            builder = builder.alpha_matting(false);
        }
        if let Some(value) = cli.fg_threshold {
            builder = builder.foreground_threshold(value);
        }
        if let Some(value) = cli.bg_threshold {
            builder = builder.background_threshold(value);
        }
        if let Some(color) = &cli.bg_color {
            let color: BackgroundColor = color.parse().context("Invalid --bg-color")?;
            builder = builder.background_color(color);
        }
        if cli.sharpen {
            builder = builder.sharpen(true);
        }
        if cli.contrast {
            builder = builder.contrast(true);
        }

        builder.build().context("Invalid processing options")
    }

    /// Pipeline limits from the size, dimension, timeout and quality flags
    pub(crate) fn pipeline_settings(cli: &Cli) -> Result<PipelineSettings> {
        let mut builder = PipelineSettings::builder();

        if let Some(pixels) = cli.max_dimension {
            builder = builder.max_dimension(pixels);
        }
        if let Some(mb) = cli.max_size_mb {
            let bytes = mb
                .checked_mul(BYTES_PER_MIB)
                .and_then(|bytes| usize::try_from(bytes).ok())
                .with_context(|| format!("--max-size-mb {} is too large", mb))?;
            builder = builder.max_input_bytes(bytes);
        }
        if let Some(secs) = cli.timeout_secs {
            builder = builder.removal_timeout(Some(Duration::from_secs(secs)));
        }
        if let Some(quality) = cli.jpeg_quality {
            builder = builder.jpeg_quality(quality);
        }

        builder.build().context("Invalid pipeline settings")
    }

    /// Parse `--options`: inline JSON when it starts with `{`, a file path otherwise
    pub(crate) fn load_options(options: &str) -> Result<ProcessingConfig> {
        let trimmed = options.trim_start();
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).context("Failed to parse inline --options JSON");
        }

        let contents = std::fs::read_to_string(options)
            .with_context(|| format!("Failed to read options file: {}", options))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse options file: {}", options))
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.input.trim().is_empty() {
            anyhow::bail!("Input path must not be empty");
        }

        if cli.preprocessed_output.as_deref() == Some("-") {
            anyhow::bail!("The preprocessed image can only be written to a file");
        }

        if cli.no_alpha_matting && (cli.fg_threshold.is_some() || cli.bg_threshold.is_some()) {
            log::warn!(
                "Thresholds only split the cut at their midpoint when alpha matting is disabled"
            );
        }

        Ok(())
    }
}
