//! Image decoding and encoding service
//!
//! Converts between raw upload/download bytes and in-memory [`Bitmap`]s. Only
//! PNG and JPEG are accepted on input and produced on output.

use crate::{
    config::OutputFormat,
    error::{PipelineError, Result, Stage},
    types::Bitmap,
};
use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat,
};
use std::borrow::Cow;

/// Decoding and encoding of raster images
///
/// The pipeline talks to the codec through this trait so that front ends can
/// substitute their own implementation (or observe calls in tests).
pub trait ImageCodec: Send + Sync {
    /// Parse PNG or JPEG bytes into a bitmap
    ///
    /// # Errors
    /// - `PipelineError::Decode` for malformed or unsupported bytes
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap>;

    /// Serialize a bitmap in the requested format
    ///
    /// # Errors
    /// - `PipelineError::UnsupportedFormat` when JPEG is requested for a bitmap
    ///   with non-opaque pixels
    /// - `PipelineError::Processing` at the encode stage for encoder failures
    fn encode(&self, bitmap: &Bitmap, format: OutputFormat) -> Result<Vec<u8>>;
}

/// Convert any bitmap to RGBA, adding an opaque alpha channel if absent
#[must_use]
pub fn normalize(bitmap: Bitmap) -> Bitmap {
    Bitmap::Rgba(bitmap.into_rgba())
}

/// Codec backed by the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct StandardCodec {
    jpeg_quality: u8,
}

impl StandardCodec {
    /// Create a codec emitting JPEG at the given quality (clamped to 1-100)
    #[must_use]
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    #[must_use]
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let (width, height) = bitmap.dimensions();
        let color_type = match bitmap {
            Bitmap::Rgb(_) => ExtendedColorType::Rgb8,
            Bitmap::Rgba(_) => ExtendedColorType::Rgba8,
        };

        PngEncoder::new(&mut buffer)
            .write_image(bitmap.as_raw(), width, height, color_type)
            .map_err(|e| PipelineError::processing(Stage::Encode, e))?;

        Ok(buffer)
    }

    fn encode_jpeg(&self, bitmap: &Bitmap) -> Result<Vec<u8>> {
        let rgb = match bitmap {
            Bitmap::Rgb(img) => Cow::Borrowed(img),
            Bitmap::Rgba(img) => {
                if !bitmap.is_opaque() {
                    return Err(PipelineError::unsupported_format(format!(
                        "cannot encode {} with transparent pixels as JPEG; composite it onto a solid background or use PNG",
                        bitmap.describe()
                    )));
                }
                Cow::Owned(DynamicImage::ImageRgba8(img.clone()).into_rgb8())
            },
        };

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| PipelineError::processing(Stage::Encode, e))?;

        Ok(buffer)
    }
}

impl Default for StandardCodec {
    fn default() -> Self {
        Self::new(90)
    }
}

impl ImageCodec for StandardCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Bitmap> {
        let format = image::guess_format(bytes)
            .map_err(|e| PipelineError::decode(format!("unrecognized image data: {}", e)))?;

        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(PipelineError::decode(format!(
                "unsupported image format {:?}; expected PNG or JPEG",
                format
            )));
        }

        let image = image::load_from_memory_with_format(bytes, format).map_err(|e| {
            PipelineError::decode(format!(
                "failed to decode {:?} image ({} bytes): {}",
                format,
                bytes.len(),
                e
            ))
        })?;

        log::debug!(
            "Decoded {:?} image {}x{} ({:?})",
            format,
            image.width(),
            image.height(),
            image.color()
        );

        // Higher bit depths are reduced to 8 bits per channel here
        let bitmap = if image.color().has_alpha() {
            Bitmap::Rgba(image.into_rgba8())
        } else {
            Bitmap::Rgb(image.into_rgb8())
        };
        Ok(bitmap)
    }

    fn encode(&self, bitmap: &Bitmap, format: OutputFormat) -> Result<Vec<u8>> {
        match format {
            OutputFormat::Png => Self::encode_png(bitmap),
            OutputFormat::Jpeg => self.encode_jpeg(bitmap),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_png_keeps_pixel_format() {
        let codec = StandardCodec::default();

        let rgb = png_bytes(DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]))));
        let decoded = codec.decode(&rgb).unwrap();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded, Bitmap::Rgb(RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]))));

        let rgba = png_bytes(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            2,
            2,
            Rgba([4, 5, 6, 7]),
        )));
        let decoded = codec.decode(&rgba).unwrap();
        assert_eq!(decoded.format(), crate::types::PixelFormat::Rgba);
        assert_eq!(decoded.alpha_channel(), vec![7; 4]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = StandardCodec::default();
        let err = codec.decode(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);

        let err = codec.decode(&[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let codec = StandardCodec::default();
        let mut bytes = png_bytes(DynamicImage::ImageRgb8(RgbImage::new(16, 16)));
        bytes.truncate(bytes.len() / 2);
        assert_eq!(codec.decode(&bytes).unwrap_err().kind(), ErrorKind::Decode);
    }

    #[test]
    fn test_decode_rejects_unsupported_format() {
        // BMP magic bytes are recognized but not accepted
        let codec = StandardCodec::default();
        let err = codec.decode(b"BM\0\0\0\0\0\0\0\0\0\0\0\0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("Bmp"));
    }

    #[test]
    fn test_normalize_adds_opaque_alpha() {
        let bitmap = Bitmap::Rgb(RgbImage::from_pixel(2, 2, Rgb([10, 20, 30])));
        let normalized = normalize(bitmap);
        assert_eq!(normalized.format(), crate::types::PixelFormat::Rgba);
        assert!(normalized.is_opaque());
        assert_eq!(
            normalized.as_rgba().unwrap().get_pixel(1, 1),
            &Rgba([10, 20, 30, 255])
        );

        let rgba = Bitmap::Rgba(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 4])));
        assert_eq!(normalize(rgba.clone()), rgba);
    }

    #[test]
    fn test_encode_png_round_trip_preserves_alpha() {
        let codec = StandardCodec::default();
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let bitmap = Bitmap::Rgba(img);

        let bytes = codec.encode(&bitmap, OutputFormat::Png).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(codec.decode(&bytes).unwrap(), bitmap);
    }

    #[test]
    fn test_encode_jpeg_requires_opaque_pixels() {
        let codec = StandardCodec::default();
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([200, 100, 50, 255]));
        img.put_pixel(3, 3, Rgba([200, 100, 50, 128]));

        let err = codec
            .encode(&Bitmap::Rgba(img), OutputFormat::Jpeg)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_encode_jpeg_from_opaque_rgba_and_rgb() {
        let codec = StandardCodec::new(80);
        let opaque = Bitmap::Rgba(RgbaImage::from_pixel(8, 8, Rgba([10, 10, 10, 255])));
        let bytes = codec.encode(&opaque, OutputFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);

        let rgb = Bitmap::Rgb(RgbImage::from_pixel(8, 8, Rgb([30, 30, 30])));
        let bytes = codec.encode(&rgb, OutputFormat::Jpeg).unwrap();
        let decoded = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.format(), crate::types::PixelFormat::Rgb);
    }

    #[test]
    fn test_jpeg_quality_is_clamped() {
        assert_eq!(StandardCodec::new(0).jpeg_quality(), 1);
        assert_eq!(StandardCodec::new(200).jpeg_quality(), 100);
    }
}
