//! The background removal pipeline
//!
//! A run validates the upload, consults the cache, and on a miss executes
//! decode → normalize → resize → enhance → remove background → composite.
//! CPU-bound stages run on the blocking thread pool; the remover call is the
//! only stage subject to a timeout.

use crate::{
    cache::{CacheKey, CacheStats, PipelineCache},
    compositor::Compositor,
    config::{OutputFormat, PipelineSettings, ProcessingConfig},
    error::{PipelineError, Result, Stage},
    remover::{self, BackgroundRemover, MattingParams},
    services::{
        codec::{normalize, ImageCodec, StandardCodec},
        progress::{NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker},
    },
    types::{
        EncodedOutputs, PipelineRequest, PipelineResult, ProcessingMetadata, ProcessingTimings,
    },
    utils::{EnhancementOptions, ImageEnhancer, ImageResizer, InputValidator},
};
use image::RgbaImage;
use instant::Instant;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info, instrument, Instrument};

/// Image background removal pipeline
///
/// Cheap to share behind an `Arc`; all runs go through the same cache.
pub struct Pipeline {
    settings: PipelineSettings,
    codec: Arc<dyn ImageCodec>,
    remover: Arc<dyn BackgroundRemover>,
    cache: Arc<PipelineCache>,
    progress: Arc<dyn ProgressReporter>,
}

impl Pipeline {
    /// Start building a pipeline around `remover`
    ///
    /// # Examples
    /// ```rust,no_run
    /// use bgremove_pipeline::{BorderKeyRemover, Pipeline, PipelineRequest, ProcessingConfig};
    /// use std::sync::Arc;
    ///
    /// # async fn example(bytes: Vec<u8>) -> anyhow::Result<()> {
    /// let pipeline = Pipeline::builder(Arc::new(BorderKeyRemover::new())).build()?;
    /// let result = pipeline
    ///     .run(PipelineRequest::new(bytes, ProcessingConfig::default()))
    ///     .await?;
    /// let outputs = pipeline.encode(&result)?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn builder(remover: Arc<dyn BackgroundRemover>) -> PipelineBuilder {
        PipelineBuilder::new(remover)
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<PipelineCache> {
        &self.cache
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Process `bytes` with `config`
    ///
    /// # Errors
    /// - See [`Pipeline::run`]
    pub async fn process_bytes(
        &self,
        bytes: Vec<u8>,
        config: ProcessingConfig,
    ) -> Result<Arc<PipelineResult>> {
        self.run(PipelineRequest::new(bytes, config)).await
    }

    /// Run the pipeline for one request
    ///
    /// Identical requests (same bytes, same config) within the cache TTL return
    /// the same shared result without recomputation, including requests that
    /// arrive while the first is still being processed.
    ///
    /// # Errors
    /// - `PayloadTooLarge` before any cache or decode work
    /// - `Decode` for empty, malformed or unsupported images
    /// - `Processing` for stage failures, tagged with the stage
    /// - `Timeout` when the remover exceeds the configured timeout
    #[instrument(
        skip_all,
        fields(
            input_bytes = request.bytes.len(),
            key = tracing::field::Empty,
            cache_hit = tracing::field::Empty
        )
    )]
    pub async fn run(&self, request: PipelineRequest) -> Result<Arc<PipelineResult>> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.progress));

        tracker.report_stage(ProcessingStage::Validation);
        if let Err(e) =
            InputValidator::validate_payload_size(request.bytes.len(), self.settings.max_input_bytes)
                .and_then(|()| InputValidator::validate_not_empty(&request.bytes))
        {
            tracker.report_error(&e.to_string());
            return Err(e);
        }

        tracker.report_stage(ProcessingStage::CacheLookup);
        // SHA-256 over the full payload runs on the blocking pool
        let (request, key) = match run_blocking(Stage::Decode, move || {
            let key = request.cache_key();
            Ok((request, key))
        })
        .await
        {
            Ok(keyed) => keyed,
            Err(e) => {
                tracker.report_error(&e.to_string());
                return Err(e);
            },
        };
        tracing::Span::current().record("key", tracing::field::display(&key));

        let computed = AtomicBool::new(false);
        let outcome = self
            .cache
            .get_or_compute(key, || {
                computed.store(true, Ordering::SeqCst);
                self.process(request, key, &mut tracker)
            })
            .await;

        let cache_hit = !computed.load(Ordering::SeqCst);
        tracing::Span::current().record("cache_hit", cache_hit);

        match outcome {
            Ok(result) => {
                if cache_hit {
                    tracker.report_cache_hit();
                } else {
                    tracker.report_completion(&result.metadata.timings);
                }
                Ok(result)
            },
            Err(e) => {
                tracker.report_error(&e.to_string());
                Err(e)
            },
        }
    }

    /// Serialize both images of a result for download
    ///
    /// The preprocessed image is always PNG; the final image uses the format
    /// recorded in the result metadata.
    ///
    /// # Errors
    /// - Encoder failures, or JPEG requested for a non-opaque image
    pub fn encode(&self, result: &PipelineResult) -> Result<EncodedOutputs> {
        let final_format = result.metadata.output_format;
        let preprocessed_png = self.codec.encode(&result.preprocessed, OutputFormat::Png)?;
        let final_bytes = self.codec.encode(&result.final_image, final_format)?;

        Ok(EncodedOutputs {
            preprocessed_png,
            final_bytes,
            final_format,
        })
    }

    async fn process(
        &self,
        request: PipelineRequest,
        key: CacheKey,
        tracker: &mut ProgressTracker,
    ) -> Result<PipelineResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();
        let PipelineRequest { bytes, config } = request;

        // Decode and normalize to RGBA
        tracker.report_stage(ProcessingStage::Decoding);
        let stage_start = Instant::now();
        let codec = Arc::clone(&self.codec);
        let bitmap = run_blocking(Stage::Decode, move || codec.decode(&bytes).map(normalize))
            .instrument(tracing::debug_span!("decode"))
            .await?;
        timings.decode = stage_start.elapsed();
        let original_dimensions = bitmap.dimensions();
        debug!(image = %bitmap.describe(), "decoded input");

        // Resize
        tracker.report_stage(ProcessingStage::Resizing);
        let stage_start = Instant::now();
        let max_dimension = self.settings.max_dimension;
        let resized = run_blocking(Stage::Resize, move || {
            ImageResizer::resize(bitmap, max_dimension)
        })
        .instrument(tracing::debug_span!("resize", max_dimension))
        .await?;
        timings.resize = stage_start.elapsed();

        // Enhance
        tracker.report_stage(ProcessingStage::Enhancing);
        let stage_start = Instant::now();
        let options = EnhancementOptions {
            sharpen: config.use_sharpen,
            contrast: config.use_contrast,
        };
        let preprocessed = if options.is_noop() {
            resized
        } else {
            run_blocking(Stage::Enhance, move || {
                Ok(ImageEnhancer::enhance(resized, options))
            })
            .instrument(tracing::debug_span!(
                "enhance",
                sharpen = options.sharpen,
                contrast = options.contrast
            ))
            .await?
        };
        timings.enhance = stage_start.elapsed();

        // Remove background
        tracker.report_stage(ProcessingStage::BackgroundRemoval);
        let stage_start = Instant::now();
        let input = preprocessed.clone().into_rgba();
        let input_dimensions = input.dimensions();
        let cutout = self
            .remove_background(input, MattingParams::from(&config))
            .instrument(tracing::info_span!(
                "remove_background",
                remover = self.remover.name(),
                width = input_dimensions.0,
                height = input_dimensions.1
            ))
            .await?;
        remover::validate_output(input_dimensions, &cutout)?;
        timings.background_removal = stage_start.elapsed();

        // Composite
        tracker.report_stage(ProcessingStage::Compositing);
        let stage_start = Instant::now();
        let background = config.background_color;
        let final_image = run_blocking(Stage::Composite, move || {
            Ok(Compositor::composite(cutout, background))
        })
        .instrument(tracing::debug_span!("composite", background = %background))
        .await?;
        timings.composite = stage_start.elapsed();
        timings.total = total_start.elapsed();

        info!(
            total_ms = timings.total.as_millis() as u64,
            output = %final_image.describe(),
            "Processed in {:.2} seconds",
            timings.total.as_secs_f64()
        );

        Ok(PipelineResult {
            preprocessed,
            final_image,
            metadata: ProcessingMetadata {
                cache_key: key,
                original_dimensions,
                output_format: config.output_format(),
                timings,
            },
        })
    }

    async fn remove_background(&self, image: RgbaImage, params: MattingParams) -> Result<RgbaImage> {
        let call = self.remover.remove(image, params);

        match self.settings.removal_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "background removal timed out");
                PipelineError::Timeout {
                    stage: Stage::RemoveBackground,
                    after: limit,
                }
            })?,
            None => call.await,
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("settings", &self.settings)
            .field("remover", &self.remover.name())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Run CPU-bound stage work on the blocking pool
async fn run_blocking<T, F>(stage: Stage, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::processing(stage, e))?
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    settings: PipelineSettings,
    remover: Arc<dyn BackgroundRemover>,
    codec: Option<Arc<dyn ImageCodec>>,
    cache: Option<Arc<PipelineCache>>,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(remover: Arc<dyn BackgroundRemover>) -> Self {
        Self {
            settings: PipelineSettings::default(),
            remover,
            codec: None,
            cache: None,
            progress: None,
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use a custom codec instead of [`StandardCodec`]
    #[must_use]
    pub fn codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Share an existing cache (its own TTL and capacity apply)
    #[must_use]
    pub fn cache(mut self, cache: Arc<PipelineCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Validate settings and assemble the pipeline
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineSettings::validate`]
    pub fn build(self) -> Result<Pipeline> {
        self.settings.validate()?;

        let codec = self
            .codec
            .unwrap_or_else(|| Arc::new(StandardCodec::new(self.settings.jpeg_quality)));
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(PipelineCache::from_settings(&self.settings)));
        let progress = self
            .progress
            .unwrap_or_else(|| Arc::new(NoOpProgressReporter));

        debug!(
            remover = self.remover.name(),
            max_dimension = self.settings.max_dimension,
            cache_capacity = cache.capacity(),
            "pipeline ready"
        );

        Ok(Pipeline {
            settings: self.settings,
            codec,
            remover: self.remover,
            cache,
            progress,
        })
    }
}
