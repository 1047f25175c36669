//! Shared fixtures and test doubles for integration tests

#![allow(dead_code)]
#![allow(unreachable_pub)]

use async_trait::async_trait;
use bgremove_pipeline::{
    error::{PipelineError, Result, Stage},
    services::{ImageCodec, StandardCodec},
    BackgroundRemover, Bitmap, MattingParams, OutputFormat,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

/// Route `log` records to the test output (idempotent)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Opaque gradient image encoded in `format`
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let intensity = ((x / 16 + y / 16) % 200) as u8;
        Rgb([intensity, 128, 255 - intensity])
    });

    let mut buffer = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

pub fn png_image(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Png)
}

pub fn jpeg_image(width: u32, height: u32) -> Vec<u8> {
    encoded_image(width, height, ImageFormat::Jpeg)
}

/// Subject on a flat backdrop: a red square centered on light gray
pub fn subject_on_backdrop(size: u32) -> Vec<u8> {
    let margin = size / 4;
    let image = RgbImage::from_fn(size, size, |x, y| {
        let inside = (margin..size - margin).contains(&x) && (margin..size - margin).contains(&y);
        if inside {
            Rgb([200, 20, 20])
        } else {
            Rgb([235, 235, 235])
        }
    });

    let mut buffer = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buffer, ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

/// Remover double: left half opaque, right half transparent
///
/// Counts invocations across clones and can be slowed down or made to fail.
#[derive(Debug, Clone, Default)]
pub struct CountingRemover {
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
    failure: Option<String>,
}

impl CountingRemover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundRemover for CountingRemover {
    async fn remove(&self, mut image: RgbaImage, _params: MattingParams) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref message) = self.failure {
            return Err(PipelineError::processing_stage_error(
                Stage::RemoveBackground,
                message,
                None,
            ));
        }

        let half = image.width() / 2;
        for (x, _, pixel) in image.enumerate_pixels_mut() {
            pixel.0[3] = if x < half { 255 } else { 0 };
        }
        Ok(image)
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// Codec double that counts decode calls and delegates to [`StandardCodec`]
#[derive(Debug, Clone, Default)]
pub struct CountingCodec {
    inner: StandardCodec,
    decodes: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decodes(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }
}

impl ImageCodec for CountingCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        self.inner.decode(bytes)
    }

    fn encode(&self, bitmap: &Bitmap, format: OutputFormat) -> Result<Vec<u8>> {
        self.inner.encode(bitmap, format)
    }
}
