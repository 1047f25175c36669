//! Output format handling service
//!
//! Download-facing rules for the final image: which encoding to use, and how to
//! name and label the resulting file.

use crate::config::{BackgroundColor, OutputFormat};
use std::path::Path;

/// Service for output format decisions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encoding for a result composited onto `background`
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_pipeline::{services::OutputFormatHandler, BackgroundColor, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::format_for(BackgroundColor::Transparent), OutputFormat::Png);
    /// assert_eq!(OutputFormatHandler::format_for(BackgroundColor::rgb(0, 0, 0)), OutputFormat::Jpeg);
    /// ```
    #[must_use]
    pub fn format_for(background: BackgroundColor) -> OutputFormat {
        OutputFormat::for_background(background)
    }

    /// File extension (without the dot)
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    #[must_use]
    pub fn mime_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// Check if a format supports transparency (alpha channel)
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png => true,
            OutputFormat::Jpeg => false,
        }
    }

    /// Name offered for downloading the processed image
    ///
    /// Everything from the first `.` of the uploaded file name is dropped, then
    /// `processed_` and the format extension are added.
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_pipeline::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(
    ///     OutputFormatHandler::download_file_name("zebra.jpg", OutputFormat::Png),
    ///     "processed_zebra.png"
    /// );
    /// ```
    #[must_use]
    pub fn download_file_name(original_name: &str, format: OutputFormat) -> String {
        let file_name = Path::new(original_name)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(original_name);
        let stem = file_name.split('.').next().unwrap_or_default();
        let stem = if stem.is_empty() { "image" } else { stem };

        format!("processed_{}.{}", stem, Self::get_extension(format))
    }

    /// Format named by a path's extension, if it is one we write
    #[must_use]
    pub fn format_from_path(path: &Path) -> Option<OutputFormat> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            _ => None,
        }
    }

    /// Log a warning when `path` suggests a different encoding than `format`
    ///
    /// Returns `true` when a warning was emitted.
    pub fn warn_on_extension_mismatch(path: &Path, format: OutputFormat) -> bool {
        match Self::format_from_path(path) {
            Some(named) if named != format => {
                log::warn!(
                    "{} has a .{} extension but will contain {} data ({})",
                    path.display(),
                    Self::get_extension(named),
                    format,
                    Self::mime_type(format)
                );
                true
            },
            _ => false,
        }
    }
}
