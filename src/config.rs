//! Configuration types for pipeline requests and the pipeline itself

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default byte limit for uploaded images (15 MiB)
pub const DEFAULT_MAX_INPUT_BYTES: usize = 15 * 1024 * 1024;

/// Default limit for the longer image side, in pixels
pub const DEFAULT_MAX_DIMENSION: u32 = 2500;

/// Default validity window of cached results
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default number of results kept by the cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Background placed behind the cut-out foreground
///
/// A color whose alpha component is 0 means the same as [`BackgroundColor::Transparent`]:
/// a color picker with an alpha slider can request a transparent result without a
/// separate switch. [`BackgroundColor::is_transparent`] is the single place that
/// rule lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BackgroundColor {
    Transparent,
    Rgba([u8; 4]),
}

impl BackgroundColor {
    /// Opaque color from RGB components
    #[must_use]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::Rgba([r, g, b, u8::MAX])
    }

    /// Whether compositing should keep the alpha channel
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        match self {
            Self::Transparent => true,
            Self::Rgba([_, _, _, a]) => *a == 0,
        }
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        // Matches the dark application theme
        Self::rgb(0x1E, 0x1E, 0x1E)
    }
}

impl fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transparent => write!(f, "transparent"),
            Self::Rgba([r, g, b, 255]) => write!(f, "#{:02X}{:02X}{:02X}", r, g, b),
            Self::Rgba([r, g, b, a]) => write!(f, "#{:02X}{:02X}{:02X}{:02X}", r, g, b, a),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = PipelineError;

    /// Parse `transparent`, `#RRGGBB` or `#RRGGBBAA`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("transparent") {
            return Ok(Self::Transparent);
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::invalid_config(format!(
                "Invalid background color '{}': expected 'transparent', #RRGGBB or #RRGGBBAA",
                s
            )));
        }

        let mut channels = [u8::MAX; 4];
        for (i, channel) in channels.iter_mut().enumerate().take(hex.len() / 2) {
            let pair = hex.get(i * 2..i * 2 + 2).unwrap_or("00");
            *channel = u8::from_str_radix(pair, 16).map_err(|e| {
                PipelineError::invalid_config(format!("Invalid background color '{}': {}", s, e))
            })?;
        }
        Ok(Self::Rgba(channels))
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackgroundColor> for String {
    fn from(color: BackgroundColor) -> Self {
        color.to_string()
    }
}

/// Encodings available for downloading results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    Png,
    /// JPEG, opaque images only
    Jpeg,
}

impl OutputFormat {
    /// PNG keeps transparency; any solid background is delivered as JPEG
    #[must_use]
    pub fn for_background(background: BackgroundColor) -> Self {
        if background.is_transparent() {
            Self::Png
        } else {
            Self::Jpeg
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
        }
    }
}

/// Options for a single processing request
///
/// Thresholds are stored as `u8`, so a constructed value is always in range.
/// Wider integers coming from users go through [`ProcessingConfig::builder`],
/// which rejects anything outside 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawProcessingConfig")]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessingConfig {
    /// Refine soft edges (hair, fur) in the segmentation output
    pub alpha_matting: bool,
    /// Matting scores at or above this are treated as certain foreground
    pub foreground_threshold: u8,
    /// Matting scores at or below this are treated as certain background
    pub background_threshold: u8,
    pub background_color: BackgroundColor,
    /// Sharpen before segmentation
    pub use_sharpen: bool,
    /// Boost contrast before segmentation
    pub use_contrast: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            alpha_matting: true,
            foreground_threshold: 240,
            background_threshold: 10,
            background_color: BackgroundColor::default(),
            use_sharpen: false,
            use_contrast: false,
        }
    }
}

impl ProcessingConfig {
    /// Create a new configuration builder starting from the defaults
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_pipeline::{BackgroundColor, ProcessingConfig};
    ///
    /// let config = ProcessingConfig::builder()
    ///     .alpha_matting(false)
    ///     .background_color(BackgroundColor::Transparent)
    ///     .foreground_threshold(255)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.foreground_threshold, 255);
    ///
    /// assert!(ProcessingConfig::builder().background_threshold(-1).build().is_err());
    /// ```
    #[must_use]
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder::default()
    }

    /// Format the final image will be delivered in
    #[must_use]
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::for_background(self.background_color)
    }

    /// Validate a threshold given as a wide integer
    ///
    /// # Errors
    /// - Value outside 0-255
    pub fn validate_threshold(parameter: &str, value: i64, recommended: u8) -> Result<u8> {
        u8::try_from(value).map_err(|_| {
            PipelineError::config_value_error(parameter, value, "0-255", Some(i64::from(recommended)))
        })
    }
}

/// Unvalidated wire form of [`ProcessingConfig`]
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawProcessingConfig {
    alpha_matting: bool,
    foreground_threshold: i64,
    background_threshold: i64,
    background_color: BackgroundColor,
    use_sharpen: bool,
    use_contrast: bool,
}

impl Default for RawProcessingConfig {
    fn default() -> Self {
        let defaults = ProcessingConfig::default();
        Self {
            alpha_matting: defaults.alpha_matting,
            foreground_threshold: i64::from(defaults.foreground_threshold),
            background_threshold: i64::from(defaults.background_threshold),
            background_color: defaults.background_color,
            use_sharpen: defaults.use_sharpen,
            use_contrast: defaults.use_contrast,
        }
    }
}

impl TryFrom<RawProcessingConfig> for ProcessingConfig {
    type Error = PipelineError;

    fn try_from(raw: RawProcessingConfig) -> Result<Self> {
        ProcessingConfig::builder()
            .alpha_matting(raw.alpha_matting)
            .foreground_threshold(raw.foreground_threshold)
            .background_threshold(raw.background_threshold)
            .background_color(raw.background_color)
            .sharpen(raw.use_sharpen)
            .contrast(raw.use_contrast)
            .build()
    }
}

/// Builder for `ProcessingConfig`
#[derive(Debug, Clone)]
pub struct ProcessingConfigBuilder {
    alpha_matting: bool,
    foreground_threshold: i64,
    background_threshold: i64,
    background_color: BackgroundColor,
    use_sharpen: bool,
    use_contrast: bool,
}

impl Default for ProcessingConfigBuilder {
    fn default() -> Self {
        ProcessingConfig::default().into()
    }
}

impl From<ProcessingConfig> for ProcessingConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from JSON
    fn from(config: ProcessingConfig) -> Self {
        Self {
            alpha_matting: config.alpha_matting,
            foreground_threshold: i64::from(config.foreground_threshold),
            background_threshold: i64::from(config.background_threshold),
            background_color: config.background_color,
            use_sharpen: config.use_sharpen,
            use_contrast: config.use_contrast,
        }
    }
}

impl ProcessingConfigBuilder {
    #[must_use]
    pub fn alpha_matting(mut self, enabled: bool) -> Self {
        self.alpha_matting = enabled;
        self
    }

    /// Set the foreground threshold (validated on `build`)
    #[must_use]
    pub fn foreground_threshold(mut self, value: i64) -> Self {
        self.foreground_threshold = value;
        self
    }

    /// Set the background threshold (validated on `build`)
    #[must_use]
    pub fn background_threshold(mut self, value: i64) -> Self {
        self.background_threshold = value;
        self
    }

    #[must_use]
    pub fn background_color(mut self, color: BackgroundColor) -> Self {
        self.background_color = color;
        self
    }

    #[must_use]
    pub fn sharpen(mut self, enabled: bool) -> Self {
        self.use_sharpen = enabled;
        self
    }

    #[must_use]
    pub fn contrast(mut self, enabled: bool) -> Self {
        self.use_contrast = enabled;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Foreground or background threshold outside 0-255
    pub fn build(self) -> Result<ProcessingConfig> {
        let defaults = ProcessingConfig::default();
        let foreground_threshold = ProcessingConfig::validate_threshold(
            "foreground threshold",
            self.foreground_threshold,
            defaults.foreground_threshold,
        )?;
        let background_threshold = ProcessingConfig::validate_threshold(
            "background threshold",
            self.background_threshold,
            defaults.background_threshold,
        )?;

        Ok(ProcessingConfig {
            alpha_matting: self.alpha_matting,
            foreground_threshold,
            background_threshold,
            background_color: self.background_color,
            use_sharpen: self.use_sharpen,
            use_contrast: self.use_contrast,
        })
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
    }
}

/// Limits and tuning for a [`Pipeline`](crate::Pipeline) instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Largest accepted upload, in bytes
    pub max_input_bytes: usize,

    /// Longer image side after resizing, in pixels
    pub max_dimension: u32,

    /// How long a cached result stays valid
    #[serde(rename = "cache_ttl_secs", with = "duration_secs")]
    pub cache_ttl: Duration,

    /// Maximum number of cached results before least-recently-used eviction
    pub cache_capacity: usize,

    /// Upper bound for the background removal call (None = wait indefinitely)
    #[serde(rename = "removal_timeout_secs", with = "optional_duration_secs")]
    pub removal_timeout: Option<Duration>,

    /// JPEG quality (1-100) for opaque results
    pub jpeg_quality: u8,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            removal_timeout: None,
            jpeg_quality: 90,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn builder() -> PipelineSettingsBuilder {
        PipelineSettingsBuilder::default()
    }

    /// Validate all settings
    ///
    /// # Errors
    /// - Zero byte limit, dimension, capacity or TTL
    /// - Zero removal timeout
    /// - JPEG quality outside 1-100
    pub fn validate(&self) -> Result<()> {
        if self.max_input_bytes == 0 {
            return Err(PipelineError::config_value_error(
                "maximum input size",
                self.max_input_bytes,
                ">= 1 byte",
                Some(DEFAULT_MAX_INPUT_BYTES),
            ));
        }

        if self.max_dimension == 0 {
            return Err(PipelineError::config_value_error(
                "maximum dimension",
                self.max_dimension,
                ">= 1 pixel",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }

        if self.cache_capacity == 0 {
            return Err(PipelineError::config_value_error(
                "cache capacity",
                self.cache_capacity,
                ">= 1 entry",
                Some(DEFAULT_CACHE_CAPACITY),
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(PipelineError::config_value_error(
                "cache TTL (seconds)",
                self.cache_ttl.as_secs(),
                ">= 1",
                Some(DEFAULT_CACHE_TTL.as_secs()),
            ));
        }

        if self.removal_timeout.is_some_and(|t| t.is_zero()) {
            return Err(PipelineError::invalid_config(
                "Invalid removal timeout: must be greater than zero when set",
            ));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
                Some(90),
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineSettings`
#[derive(Debug, Default)]
pub struct PipelineSettingsBuilder {
    settings: PipelineSettings,
}

impl PipelineSettingsBuilder {
    #[must_use]
    pub fn max_input_bytes(mut self, bytes: usize) -> Self {
        self.settings.max_input_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, pixels: u32) -> Self {
        self.settings.max_dimension = pixels;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.settings.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.settings.cache_capacity = entries;
        self
    }

    #[must_use]
    pub fn removal_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.removal_timeout = timeout;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.settings.jpeg_quality = quality;
        self
    }

    /// Build and validate the settings
    ///
    /// # Errors
    /// - Any rule checked by [`PipelineSettings::validate`]
    pub fn build(self) -> Result<PipelineSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
