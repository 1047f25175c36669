#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal Pipeline
//!
//! An async image pipeline that removes the background from uploaded images:
//! it validates the upload, decodes and normalizes it, resizes it to a bounded
//! size, optionally sharpens and boosts contrast, hands it to a pluggable
//! background remover, and composites the cut-out onto a transparent or solid
//! background. Results are cached by content and options with a TTL, and
//! concurrent identical requests share a single computation.
//!
//! ## Features
//!
//! - **Pluggable removers**: anything implementing [`BackgroundRemover`]; the
//!   built-in [`BorderKeyRemover`] needs no model files
//! - **Deterministic preprocessing**: aspect-preserving Lanczos resize, a 3x3
//!   sharpen and a fixed contrast curve, applied in a fixed order
//! - **Result cache**: SHA-256 keys over bytes and options, TTL, LRU capacity,
//!   single-flight computation
//! - **Typed errors** tagged with the failing stage
//! - **Tracing**: per-run and per-stage spans, stage timings in the result
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_pipeline::{
//!     BackgroundColor, BorderKeyRemover, OutputFormat, Pipeline, PipelineRequest,
//!     ProcessingConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let pipeline = Pipeline::builder(Arc::new(BorderKeyRemover::new())).build()?;
//!
//! let config = ProcessingConfig::builder()
//!     .background_color(BackgroundColor::Transparent)
//!     .sharpen(true)
//!     .build()?;
//!
//! let result = pipeline.run(PipelineRequest::new(upload, config)).await?;
//! let outputs = pipeline.encode(&result)?;
//! assert_eq!(outputs.final_format, OutputFormat::Png);
//! std::fs::write("processed.png", &outputs.final_bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Removers
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use bgremove_pipeline::{BackgroundRemover, MattingParams, Result};
//! use image::RgbaImage;
//!
//! struct KeepEverything;
//!
//! #[async_trait]
//! impl BackgroundRemover for KeepEverything {
//!     async fn remove(&self, image: RgbaImage, _params: MattingParams) -> Result<RgbaImage> {
//!         Ok(image)
//!     }
//! }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress spinner and tracing setup
//! - `tracing-json`: JSON log output for the CLI
//!
//! To use only as a library without CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! bgremove-pipeline = { version = "0.1", default-features = false }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod remover;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

// Internal imports for lib functions
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

// Public API exports
pub use backends::BorderKeyRemover;
pub use cache::{CacheKey, CacheStats, PipelineCache};
pub use compositor::Compositor;
pub use config::{
    BackgroundColor, OutputFormat, PipelineSettings, PipelineSettingsBuilder, ProcessingConfig,
    ProcessingConfigBuilder,
};
pub use error::{ErrorKind, PipelineError, Result, Stage};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use remover::{BackgroundRemover, MattingParams};
pub use services::{
    ImageCodec, NoOpProgressReporter, OutputFormatHandler, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate, StandardCodec, TracingProgressReporter,
};
pub use types::{
    Bitmap, EncodedOutputs, PipelineRequest, PipelineResult, PixelFormat, ProcessingMetadata,
    ProcessingTimings,
};
pub use utils::{EnhancementOptions, ImageEnhancer, ImageResizer, InputValidator};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from an image provided as bytes
///
/// Builds a pipeline with default settings around `remover` for a single
/// call. Its cache lives only as long as the call, so long-running services
/// should build one [`Pipeline`] and reuse it instead.
///
/// # Examples
/// ```rust,no_run
/// use bgremove_pipeline::{remove_background_from_bytes, BorderKeyRemover, ProcessingConfig};
/// use std::sync::Arc;
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let result = remove_background_from_bytes(
///     upload_bytes,
///     ProcessingConfig::default(),
///     Arc::new(BorderKeyRemover::new()),
/// )
/// .await?;
/// println!("{}", result.metadata.timings.summary());
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: Vec<u8>,
    config: ProcessingConfig,
    remover: Arc<dyn BackgroundRemover>,
) -> Result<Arc<PipelineResult>> {
    Pipeline::builder(remover)
        .build()?
        .process_bytes(image_bytes, config)
        .await
}

/// Remove the background from an async reader stream
///
/// Reads at most one byte past the pipeline's input limit, so oversized
/// streams are rejected with `PayloadTooLarge` without buffering them whole.
///
/// # Examples
/// ```rust,no_run
/// use bgremove_pipeline::{
///     remove_background_from_reader, BorderKeyRemover, Pipeline, ProcessingConfig,
/// };
/// use std::sync::Arc;
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pipeline = Pipeline::builder(Arc::new(BorderKeyRemover::new())).build()?;
/// let file = File::open("input.jpg").await?;
/// let result = remove_background_from_reader(&pipeline, file, ProcessingConfig::default()).await?;
/// std::fs::write("output.jpeg", pipeline.encode(&result)?.final_bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    pipeline: &Pipeline,
    reader: R,
    config: ProcessingConfig,
) -> Result<Arc<PipelineResult>> {
    let limit = pipeline.settings().max_input_bytes as u64;
    let mut buffer = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buffer)
        .await
        .map_err(|e| PipelineError::decode(format!("Failed to read from stream: {}", e)))?;

    pipeline.process_bytes(buffer, config).await
}
