//! Core data types for pipeline requests and results

use crate::{cache::CacheKey, config::OutputFormat, config::ProcessingConfig};
use image::{DynamicImage, RgbImage, RgbaImage};
use instant::Duration;
use std::fmt;

/// Channel layout of a [`Bitmap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit red, green, blue
    Rgb,
    /// 8-bit red, green, blue, alpha
    Rgba,
}

impl PixelFormat {
    /// Number of 8-bit channels per pixel
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rgb => write!(f, "RGB"),
            Self::Rgba => write!(f, "RGBA"),
        }
    }
}

/// In-memory raster with an explicit pixel format
///
/// The row-major buffer always holds `width * height * channels` bytes; the
/// underlying `image` buffers enforce this on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bitmap {
    Rgb(RgbImage),
    Rgba(RgbaImage),
}

impl Bitmap {
    #[must_use]
    pub fn width(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.width(),
            Self::Rgba(img) => img.width(),
        }
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.height(),
            Self::Rgba(img) => img.height(),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        match self {
            Self::Rgb(_) => PixelFormat::Rgb,
            Self::Rgba(_) => PixelFormat::Rgba,
        }
    }

    /// Raw row-major pixel bytes
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Rgb(img) => img.as_raw(),
            Self::Rgba(img) => img.as_raw(),
        }
    }

    /// Whether every pixel is fully opaque
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        match self {
            Self::Rgb(_) => true,
            Self::Rgba(img) => img.pixels().all(|p| p[3] == u8::MAX),
        }
    }

    /// Alpha channel as a flat vector (255 everywhere for RGB)
    #[must_use]
    pub fn alpha_channel(&self) -> Vec<u8> {
        match self {
            Self::Rgb(img) => vec![u8::MAX; (img.width() * img.height()) as usize],
            Self::Rgba(img) => img.pixels().map(|p| p[3]).collect(),
        }
    }

    /// Borrow the RGBA buffer, if this bitmap carries alpha
    #[must_use]
    pub fn as_rgba(&self) -> Option<&RgbaImage> {
        match self {
            Self::Rgba(img) => Some(img),
            Self::Rgb(_) => None,
        }
    }

    /// Convert into an RGBA buffer, adding opaque alpha when absent
    #[must_use]
    pub fn into_rgba(self) -> RgbaImage {
        match self {
            Self::Rgba(img) => img,
            Self::Rgb(img) => DynamicImage::ImageRgb8(img).into_rgba8(),
        }
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Rgb(img) => DynamicImage::ImageRgb8(img),
            Self::Rgba(img) => DynamicImage::ImageRgba8(img),
        }
    }

    /// Short description such as `1920x1080 RGBA`, used in logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}x{} {}", self.width(), self.height(), self.format())
    }
}

impl From<RgbImage> for Bitmap {
    fn from(img: RgbImage) -> Self {
        Self::Rgb(img)
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(img: RgbaImage) -> Self {
        Self::Rgba(img)
    }
}

/// One processing request: raw upload bytes plus the options to apply
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub bytes: Vec<u8>,
    pub config: ProcessingConfig,
}

impl PipelineRequest {
    #[must_use]
    pub fn new(bytes: Vec<u8>, config: ProcessingConfig) -> Self {
        Self { bytes, config }
    }

    /// Cache identity of this request
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::for_request(&self.bytes, &self.config)
    }
}

/// Wall-clock time spent in each stage of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingTimings {
    pub decode: Duration,
    pub resize: Duration,
    pub enhance: Duration,
    pub background_removal: Duration,
    pub composite: Duration,
    pub total: Duration,
}

impl ProcessingTimings {
    /// Human-readable breakdown, e.g. for verbose CLI output
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "decode {}ms, resize {}ms, enhance {}ms, removal {}ms, composite {}ms (total {}ms)",
            self.decode.as_millis(),
            self.resize.as_millis(),
            self.enhance.as_millis(),
            self.background_removal.as_millis(),
            self.composite.as_millis(),
            self.total.as_millis()
        )
    }
}

/// Facts about how a result was produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingMetadata {
    pub cache_key: CacheKey,
    /// Dimensions of the decoded input before resizing
    pub original_dimensions: (u32, u32),
    /// Encoding the final image should be downloaded in
    pub output_format: OutputFormat,
    pub timings: ProcessingTimings,
}

/// Output of a successful pipeline run
///
/// Results are shared through `Arc` between the cache and every caller and are
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// Input after resize and enhancement, before background removal
    pub preprocessed: Bitmap,
    /// Cut-out or composited result
    pub final_image: Bitmap,
    pub metadata: ProcessingMetadata,
}

/// Both result images serialized for download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutputs {
    /// Preprocessed image, always PNG
    pub preprocessed_png: Vec<u8>,
    pub final_bytes: Vec<u8>,
    pub final_format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba};

    #[test]
    fn test_bitmap_buffer_invariant() {
        let rgb = Bitmap::from(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])));
        assert_eq!(rgb.as_raw().len(), 4 * 3 * rgb.format().channels());

        let rgba = Bitmap::from(RgbaImage::from_pixel(4, 3, Rgba([1, 2, 3, 4])));
        assert_eq!(rgba.as_raw().len(), 4 * 3 * rgba.format().channels());
        assert_eq!(rgba.describe(), "4x3 RGBA");
    }

    #[test]
    fn test_opacity_checks() {
        let opaque = Bitmap::from(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255])));
        assert!(opaque.is_opaque());

        let mut img = RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 255]));
        img.put_pixel(1, 1, Rgba([9, 9, 9, 254]));
        let translucent = Bitmap::from(img);
        assert!(!translucent.is_opaque());
        assert_eq!(translucent.alpha_channel(), vec![255, 255, 255, 254]);

        let rgb = Bitmap::from(RgbImage::new(3, 1));
        assert!(rgb.is_opaque());
        assert_eq!(rgb.alpha_channel(), vec![255; 3]);
    }

    #[test]
    fn test_into_rgba_adds_opaque_alpha() {
        let rgb = Bitmap::from(RgbImage::from_pixel(2, 1, Rgb([10, 20, 30])));
        let rgba = rgb.into_rgba();
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }
}
