//! Reference remover keyed on the image border color
//!
//! Not a segmentation model. It assumes the subject does not touch the image
//! edges and the backdrop is roughly uniform, which holds for product shots and
//! studio portraits. Useful for running the CLI and pipeline without model files.

use crate::{
    error::{PipelineError, Result, Stage},
    remover::{BackgroundRemover, MattingParams},
};
use async_trait::async_trait;
use image::{Rgba, RgbaImage};

/// Color distance at which a pixel counts as certain foreground by default
pub const DEFAULT_TOLERANCE: f32 = 96.0;

/// Background remover that keys out the average border color
#[derive(Debug, Clone, Copy)]
pub struct BorderKeyRemover {
    tolerance: f32,
}

impl BorderKeyRemover {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Set the RGB distance that maps to a full score (values below 1 are raised to 1)
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = if tolerance.is_finite() {
            tolerance.max(1.0)
        } else {
            DEFAULT_TOLERANCE
        };
        self
    }

    #[must_use]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Mean color of the outermost rows and columns
    #[must_use]
    pub fn estimate_background(image: &RgbaImage) -> [f32; 3] {
        let (width, height) = image.dimensions();
        let mut sum = [0f64; 3];
        let mut count = 0u64;

        for (x, y, pixel) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
                for (acc, &value) in sum.iter_mut().zip(pixel.0.iter()) {
                    *acc += f64::from(value);
                }
                count += 1;
            }
        }

        if count == 0 {
            return [0.0; 3];
        }
        sum.map(|channel| (channel / count as f64) as f32)
    }

    /// Foreground score 0-255 from the distance to the background color
    fn score(&self, pixel: &Rgba<u8>, background: [f32; 3]) -> u8 {
        let distance = pixel
            .0
            .iter()
            .zip(background.iter())
            .map(|(&value, &bg)| {
                let delta = f32::from(value) - bg;
                delta * delta
            })
            .sum::<f32>()
            .sqrt();

        (distance / self.tolerance * 255.0).round().clamp(0.0, 255.0) as u8
    }

    fn key_out(&self, mut image: RgbaImage, params: MattingParams) -> RgbaImage {
        let background = Self::estimate_background(&image);

        for pixel in image.pixels_mut() {
            let alpha = map_score(self.score(pixel, background), params);
            let combined = (u16::from(pixel.0[3]) * u16::from(alpha) + 127) / 255;
            pixel.0[3] = combined as u8;
        }

        image
    }
}

impl Default for BorderKeyRemover {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a foreground score to alpha
///
/// Without matting the cut is hard at the midpoint between the thresholds. With
/// matting, scores between the thresholds ramp linearly from 0 to 255.
#[must_use]
pub fn map_score(score: u8, params: MattingParams) -> u8 {
    let fg = params.foreground_threshold;
    let bg = params.background_threshold;

    if !params.alpha_matting || fg <= bg {
        let cut = (u16::from(fg) + u16::from(bg)) / 2;
        return if u16::from(score) >= cut { 255 } else { 0 };
    }

    if score >= fg {
        255
    } else if score <= bg {
        0
    } else {
        let span = f32::from(fg - bg);
        (f32::from(score - bg) / span * 255.0).round() as u8
    }
}

#[async_trait]
impl BackgroundRemover for BorderKeyRemover {
    async fn remove(&self, image: RgbaImage, params: MattingParams) -> Result<RgbaImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::processing_stage_error(
                Stage::RemoveBackground,
                "cannot key an empty image",
                None,
            ));
        }

        let remover = *self;
        tokio::task::spawn_blocking(move || remover.key_out(image, params))
            .await
            .map_err(|e| PipelineError::processing(Stage::RemoveBackground, e))
    }

    fn name(&self) -> &str {
        "border-key"
    }
}
