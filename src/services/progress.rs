//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different front ends to implement their own progress handling.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Progress stages of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Checking the upload against the size limit
    Validation,
    /// Looking for a cached result
    CacheLookup,
    /// Decoding and normalizing the input image
    Decoding,
    /// Downsampling oversized images
    Resizing,
    /// Applying sharpen/contrast pre-filters
    Enhancing,
    /// Running the background remover
    BackgroundRemoval,
    /// Placing the cut-out onto the background
    Compositing,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Validation => "Validating upload",
            ProcessingStage::CacheLookup => "Checking cache",
            ProcessingStage::Decoding => "Decoding image",
            ProcessingStage::Resizing => "Resizing image",
            ProcessingStage::Enhancing => "Applying enhancements",
            ProcessingStage::BackgroundRemoval => "Removing background",
            ProcessingStage::Compositing => "Compositing result",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Validation => 2,
            ProcessingStage::CacheLookup => 5,
            ProcessingStage::Decoding => 10,
            ProcessingStage::Resizing => 20,
            ProcessingStage::Enhancing => 25,
            ProcessingStage::BackgroundRemoval => 30,
            ProcessingStage::Compositing => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during pipeline runs
///
/// Reporters are shared by every run of a pipeline and may be called from
/// several tasks at once.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);

    /// Report that a run was answered from the cache
    fn report_cache_hit(&self) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Reporter that forwards progress to `tracing` events
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            tracing::info!(
                progress = update.progress,
                elapsed_ms = update.elapsed_ms,
                "{}",
                update.description
            );
        } else {
            tracing::debug!(progress = update.progress, "{}", update.description);
        }
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        // The pipeline itself logs the total; this adds the per-stage breakdown
        if self.verbose {
            tracing::info!("Stage timings: {}", timings.summary());
        } else {
            tracing::debug!("Stage timings: {}", timings.summary());
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        tracing::error!(stage = ?stage, "Error during {}: {}", stage.description(), error);
    }

    fn report_cache_hit(&self) {
        tracing::info!("Result served from cache");
    }
}

/// Per-run progress tracker
///
/// Remembers when the run started and which stage it is in, so that errors can
/// be attributed without the caller threading the stage around.
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_cache_hit(&mut self) {
        self.reporter.report_cache_hit();
        self.report_stage(ProcessingStage::Completed);
    }

    pub fn report_completion(&mut self, timings: &ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Validation);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
