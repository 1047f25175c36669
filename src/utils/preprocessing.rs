//! Image preprocessing applied before background removal
//!
//! Two steps run on every pipeline miss:
//! - [`ImageResizer`] caps the longer side at the configured maximum
//! - [`ImageEnhancer`] applies the optional sharpen and contrast pre-filters

use crate::{
    error::{PipelineError, Result, Stage},
    types::Bitmap,
};
use image::{imageops::FilterType, ImageBuffer, Pixel};

/// Contrast gain around mid-gray
const CONTRAST_FACTOR: f32 = 1.2;

/// Pivot value that contrast adjustment leaves unchanged
const CONTRAST_PIVOT: f32 = 128.0;

/// Sharpen kernel weights: center and each of the 8 neighbors, before dividing by 16
const SHARPEN_CENTER: i32 = 32;
const SHARPEN_NEIGHBOR: i32 = -2;
const SHARPEN_DIVISOR: f32 = 16.0;

/// Proportional downsampling to a maximum side length
pub struct ImageResizer;

impl ImageResizer {
    /// Compute the output dimensions for an image limited to `max_dimension`
    ///
    /// Images within the limit keep their size. Otherwise the longer side becomes
    /// `max_dimension` and the shorter side is scaled by the same ratio, rounded
    /// to the nearest pixel and never below 1.
    ///
    /// # Errors
    /// - Zero width, height or `max_dimension`
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_pipeline::utils::ImageResizer;
    ///
    /// assert_eq!(ImageResizer::target_dimensions(5000, 2500, 2500).unwrap(), (2500, 1250));
    /// assert_eq!(ImageResizer::target_dimensions(800, 600, 2500).unwrap(), (800, 600));
    /// ```
    pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> Result<(u32, u32)> {
        if max_dimension == 0 {
            return Err(PipelineError::processing_stage_error(
                Stage::Resize,
                "maximum dimension must be at least 1 pixel",
                None,
            ));
        }

        if width == 0 || height == 0 {
            return Err(PipelineError::processing_stage_error(
                Stage::Resize,
                "cannot resize an image with a zero dimension",
                Some(&format!("{}x{}", width, height)),
            ));
        }

        if width <= max_dimension && height <= max_dimension {
            return Ok((width, height));
        }

        let long = f64::from(width.max(height));
        let short = f64::from(width.min(height));
        let scaled_short = (f64::from(max_dimension) / (long / short)).round().max(1.0) as u32;

        if width >= height {
            Ok((max_dimension, scaled_short))
        } else {
            Ok((scaled_short, max_dimension))
        }
    }

    /// Downsample `bitmap` so neither side exceeds `max_dimension`
    ///
    /// A bitmap already within the limit is moved through untouched. Resampling
    /// uses a Lanczos3 filter and keeps the pixel format.
    ///
    /// # Errors
    /// - Zero width, height or `max_dimension`
    pub fn resize(bitmap: Bitmap, max_dimension: u32) -> Result<Bitmap> {
        let (width, height) = bitmap.dimensions();
        let (new_width, new_height) = Self::target_dimensions(width, height, max_dimension)?;

        if (new_width, new_height) == (width, height) {
            return Ok(bitmap);
        }

        log::debug!(
            "Resizing {} to {}x{} (max dimension {})",
            bitmap.describe(),
            new_width,
            new_height,
            max_dimension
        );

        let resized = match bitmap {
            Bitmap::Rgb(img) => Bitmap::Rgb(image::imageops::resize(
                &img,
                new_width,
                new_height,
                FilterType::Lanczos3,
            )),
            Bitmap::Rgba(img) => Bitmap::Rgba(image::imageops::resize(
                &img,
                new_width,
                new_height,
                FilterType::Lanczos3,
            )),
        };

        Ok(resized)
    }
}

/// Which pre-filters to apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnhancementOptions {
    pub sharpen: bool,
    pub contrast: bool,
}

impl EnhancementOptions {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.sharpen && !self.contrast
    }
}

/// Optional pre-filters run before segmentation
///
/// Filters touch only the color channels; alpha passes through unchanged.
pub struct ImageEnhancer;

impl ImageEnhancer {
    /// Apply the enabled filters, always sharpening before adjusting contrast
    #[must_use]
    pub fn enhance(bitmap: Bitmap, options: EnhancementOptions) -> Bitmap {
        if options.is_noop() {
            return bitmap;
        }

        match bitmap {
            Bitmap::Rgb(mut img) => {
                Self::apply(&mut img, options);
                Bitmap::Rgb(img)
            },
            Bitmap::Rgba(mut img) => {
                Self::apply(&mut img, options);
                Bitmap::Rgba(img)
            },
        }
    }

    fn apply<P>(img: &mut ImageBuffer<P, Vec<u8>>, options: EnhancementOptions)
    where
        P: Pixel<Subpixel = u8>,
    {
        let (width, height) = img.dimensions();
        let channels = usize::from(P::CHANNEL_COUNT);

        if options.sharpen {
            sharpen_in_place(img, width as usize, height as usize, channels);
        }
        if options.contrast {
            contrast_in_place(img, channels);
        }
    }
}

/// 3x3 sharpen on the first three channels, sampling edges by clamping
fn sharpen_in_place(buffer: &mut [u8], width: usize, height: usize, channels: usize) {
    if width == 0 || height == 0 {
        return;
    }

    let source = buffer.to_vec();
    let stride = width * channels;

    #[allow(clippy::indexing_slicing)]
    // Safe: x/y are clamped to the image and c < channels, so every index is within width*height*channels
    for y in 0..height {
        let rows = [y.saturating_sub(1), y, (y + 1).min(height - 1)];
        for x in 0..width {
            let cols = [x.saturating_sub(1), x, (x + 1).min(width - 1)];
            for c in 0..3 {
                let mut sum = 0i32;
                for (ky, &sy) in rows.iter().enumerate() {
                    for (kx, &sx) in cols.iter().enumerate() {
                        let weight = if ky == 1 && kx == 1 {
                            SHARPEN_CENTER
                        } else {
                            SHARPEN_NEIGHBOR
                        };
                        sum += weight * i32::from(source[sy * stride + sx * channels + c]);
                    }
                }
                let value = (sum as f32 / SHARPEN_DIVISOR).round().clamp(0.0, 255.0);
                buffer[y * stride + x * channels + c] = value as u8;
            }
        }
    }
}

/// Linear contrast stretch around mid-gray on the first three channels
fn contrast_in_place(buffer: &mut [u8], channels: usize) {
    let lut = contrast_lut();

    for pixel in buffer.chunks_exact_mut(channels) {
        for value in pixel.iter_mut().take(3) {
            *value = lut[usize::from(*value)];
        }
    }
}

fn contrast_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (input, slot) in lut.iter_mut().enumerate() {
        let adjusted = CONTRAST_PIVOT + CONTRAST_FACTOR * (input as f32 - CONTRAST_PIVOT);
        *slot = adjusted.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_resize_identity_within_limit() {
        let img = RgbaImage::from_fn(40, 30, |x, y| Rgba([x as u8, y as u8, 7, 200]));
        let bitmap = Bitmap::Rgba(img.clone());
        let resized = ImageResizer::resize(bitmap, 40).unwrap();
        assert_eq!(resized, Bitmap::Rgba(img));
    }

    #[test]
    fn test_resize_caps_longer_side() {
        let bitmap = Bitmap::Rgb(RgbImage::from_pixel(300, 200, Rgb([90, 90, 90])));
        let resized = ImageResizer::resize(bitmap, 150).unwrap();
        assert_eq!(resized.dimensions(), (150, 100));
        assert_eq!(resized.format(), crate::types::PixelFormat::Rgb);

        let bitmap = Bitmap::Rgba(RgbaImage::new(120, 360));
        let resized = ImageResizer::resize(bitmap, 90).unwrap();
        assert_eq!(resized.dimensions(), (30, 90));
    }

    #[test]
    fn test_target_dimensions_rounding() {
        // 2500 / (3000 / 1001) = 834.17 -> 834
        assert_eq!(ImageResizer::target_dimensions(3000, 1001, 2500).unwrap(), (2500, 834));
        // 2500 / (3000 / 1003) = 835.83 -> 836
        assert_eq!(ImageResizer::target_dimensions(1003, 3000, 2500).unwrap(), (836, 2500));
        assert_eq!(ImageResizer::target_dimensions(4000, 4000, 2500).unwrap(), (2500, 2500));
    }

    #[test]
    fn test_target_dimensions_minimum_one_pixel() {
        assert_eq!(ImageResizer::target_dimensions(10_000, 1, 100).unwrap(), (100, 1));
        assert_eq!(ImageResizer::target_dimensions(1, 10_000, 10).unwrap(), (1, 10));
    }

    #[test]
    fn test_aspect_ratio_preserved_within_one_pixel() {
        for (w, h) in [(5000, 3333), (2501, 17), (9999, 2500), (640, 4801)] {
            let (nw, nh) = ImageResizer::target_dimensions(w, h, 2500).unwrap();
            assert_eq!(nw.max(nh), 2500);
            let (short_in, long_in, short_out) = if w >= h { (h, w, nh) } else { (w, h, nw) };
            let expected = 2500.0 * f64::from(short_in) / f64::from(long_in);
            assert!(
                (f64::from(short_out) - expected).abs() <= 1.0,
                "{}x{} -> {}x{}",
                w,
                h,
                nw,
                nh
            );
        }
    }

    #[test]
    fn test_resize_rejects_degenerate_input() {
        let err = ImageResizer::target_dimensions(0, 10, 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
        assert_eq!(err.stage(), Some(Stage::Resize));

        let err = ImageResizer::resize(Bitmap::Rgb(RgbImage::new(4, 4)), 0).unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Resize));
    }

    #[test]
    fn test_enhance_noop_when_disabled() {
        let img = RgbaImage::from_fn(5, 5, |x, y| Rgba([x as u8 * 40, y as u8 * 40, 3, 77]));
        let bitmap = Bitmap::Rgba(img.clone());
        assert_eq!(
            ImageEnhancer::enhance(bitmap, EnhancementOptions::default()),
            Bitmap::Rgba(img)
        );
    }

    #[test]
    fn test_sharpen_uniform_image_unchanged() {
        // Kernel weights sum to 16, so flat regions keep their value
        let img = RgbaImage::from_pixel(6, 4, Rgba([100, 150, 200, 90]));
        let options = EnhancementOptions {
            sharpen: true,
            contrast: false,
        };
        let out = ImageEnhancer::enhance(Bitmap::Rgba(img.clone()), options);
        assert_eq!(out, Bitmap::Rgba(img));
    }

    #[test]
    fn test_sharpen_boosts_isolated_pixel() {
        let mut img = RgbImage::from_pixel(3, 3, Rgb([100, 100, 100]));
        img.put_pixel(1, 1, Rgb([120, 120, 120]));
        let options = EnhancementOptions {
            sharpen: true,
            contrast: false,
        };
        let out = ImageEnhancer::enhance(Bitmap::Rgb(img), options);
        let Bitmap::Rgb(out) = out else {
            panic!("pixel format changed");
        };
        // center: (32*120 - 2*8*100) / 16 = 140
        assert_eq!(out.get_pixel(1, 1), &Rgb([140, 140, 140]));
        // corner neighbors: (32*100 - 2*(7*100 + 120)) / 16 = 97.5 -> 98
        assert_eq!(out.get_pixel(0, 0), &Rgb([98, 98, 98]));
    }

    #[test]
    fn test_contrast_values_and_alpha_preserved() {
        let img = RgbaImage::from_fn(4, 1, |x, _| match x {
            0 => Rgba([0, 128, 255, 10]),
            1 => Rgba([100, 200, 138, 20]),
            2 => Rgba([20, 240, 129, 30]),
            _ => Rgba([127, 1, 254, 40]),
        });
        let options = EnhancementOptions {
            sharpen: false,
            contrast: true,
        };
        let Bitmap::Rgba(out) = ImageEnhancer::enhance(Bitmap::Rgba(img), options) else {
            panic!("pixel format changed");
        };
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 128, 255, 10]));
        // 128 + 1.2 * (100 - 128) = 94.4 -> 94; 128 + 1.2 * 72 = 214.4 -> 214; 128 + 12 = 140
        assert_eq!(out.get_pixel(1, 0), &Rgba([94, 214, 140, 20]));
        // 20 -> -1.6 clamps to 0; 240 -> 262.4 clamps to 255; 129 -> 129.2 -> 129
        assert_eq!(out.get_pixel(2, 0), &Rgba([0, 255, 129, 30]));
        assert_eq!(out.get_pixel(3, 0).0[3], 40);
    }

    #[test]
    fn test_filter_order_is_sharpen_then_contrast() {
        let img = RgbImage::from_fn(5, 5, |x, y| Rgb([(x * 50) as u8, (y * 50) as u8, 128]));
        let both = ImageEnhancer::enhance(
            Bitmap::Rgb(img.clone()),
            EnhancementOptions {
                sharpen: true,
                contrast: true,
            },
        );

        let sharpened = ImageEnhancer::enhance(
            Bitmap::Rgb(img),
            EnhancementOptions {
                sharpen: true,
                contrast: false,
            },
        );
        let then_contrast = ImageEnhancer::enhance(
            sharpened,
            EnhancementOptions {
                sharpen: false,
                contrast: true,
            },
        );

        assert_eq!(both, then_contrast);
    }
}
