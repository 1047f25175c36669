//! Placing the cut-out foreground onto its final background

use crate::{config::BackgroundColor, types::Bitmap};
use image::{Rgb, RgbImage, RgbaImage};

/// Background compositing
pub struct Compositor;

impl Compositor {
    /// Composite `foreground` onto `background`
    ///
    /// A transparent background (including any color with alpha 0) returns the
    /// foreground unchanged. Any other color produces a fully opaque RGB image:
    /// each pixel is `fg * a + color * (255 - a)` over 255, rounded to nearest.
    /// The color's own alpha only matters for the transparency check.
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_pipeline::{compositor::Compositor, BackgroundColor, Bitmap};
    /// use image::{Rgba, RgbaImage};
    ///
    /// let fg = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 0]));
    /// let out = Compositor::composite(fg, BackgroundColor::rgb(10, 20, 30));
    /// assert!(out.is_opaque());
    /// assert_eq!(out.as_raw(), &[10, 20, 30]);
    /// ```
    #[must_use]
    pub fn composite(foreground: RgbaImage, background: BackgroundColor) -> Bitmap {
        let color = match background {
            BackgroundColor::Rgba(color) if !background.is_transparent() => color,
            _ => return Bitmap::Rgba(foreground),
        };

        let (width, height) = foreground.dimensions();
        let mut output = RgbImage::new(width, height);

        for (out, fg) in output.pixels_mut().zip(foreground.pixels()) {
            let alpha = u32::from(fg.0[3]);
            let mut blended = [0u8; 3];
            for ((slot, &f), &b) in blended.iter_mut().zip(fg.0.iter()).zip(color.iter()) {
                *slot = blend(f, b, alpha);
            }
            *out = Rgb(blended);
        }

        Bitmap::Rgb(output)
    }
}

fn blend(foreground: u8, background: u8, alpha: u32) -> u8 {
    let value = u32::from(foreground) * alpha + u32::from(background) * (255 - alpha);
    ((value + 127) / 255) as u8
}
