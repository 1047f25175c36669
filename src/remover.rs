//! Background remover abstraction
//!
//! The segmentation model is an external collaborator. The pipeline only relies
//! on the contract below: an RGBA image goes in, an RGBA image of the same size
//! comes out with alpha marking the foreground.

use crate::{
    config::ProcessingConfig,
    error::{PipelineError, Result, Stage},
};
use async_trait::async_trait;
use image::RgbaImage;

/// Parameters forwarded to the remover for every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MattingParams {
    /// Refine soft edges instead of producing a hard cut
    pub alpha_matting: bool,
    /// Scores at or above this are certain foreground
    pub foreground_threshold: u8,
    /// Scores at or below this are certain background
    pub background_threshold: u8,
}

impl From<&ProcessingConfig> for MattingParams {
    fn from(config: &ProcessingConfig) -> Self {
        Self {
            alpha_matting: config.alpha_matting,
            foreground_threshold: config.foreground_threshold,
            background_threshold: config.background_threshold,
        }
    }
}

impl Default for MattingParams {
    fn default() -> Self {
        Self::from(&ProcessingConfig::default())
    }
}

/// Trait for background removal implementations
///
/// Implementations must be shareable across tasks; the pipeline calls
/// `remove` concurrently for distinct requests.
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Produce a cut-out of `image`
    ///
    /// The returned image must have the same dimensions as the input.
    ///
    /// # Errors
    /// - Any failure of the underlying model
    async fn remove(&self, image: RgbaImage, params: MattingParams) -> Result<RgbaImage>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

/// Check that a remover honored the size contract
///
/// # Errors
/// - `PipelineError::Processing` at the background removal stage on a size mismatch
pub fn validate_output(input_dimensions: (u32, u32), output: &RgbaImage) -> Result<()> {
    if output.dimensions() != input_dimensions {
        return Err(PipelineError::processing_stage_error(
            Stage::RemoveBackground,
            &format!(
                "remover returned {}x{} output",
                output.width(),
                output.height()
            ),
            Some(&format!("{}x{}", input_dimensions.0, input_dimensions.1)),
        ));
    }
    Ok(())
}
