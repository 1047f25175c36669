//! Error types for pipeline operations

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Shared, cloneable underlying cause of a stage failure
pub type ErrorCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stages that can fail after the input has been accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Resize,
    Enhance,
    RemoveBackground,
    Composite,
    Encode,
}

impl Stage {
    /// Stable identifier used in logs and error messages
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Resize => "resize",
            Self::Enhance => "enhance",
            Self::RemoveBackground => "remove_background",
            Self::Composite => "composite",
            Self::Encode => "encode",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of a [`PipelineError`], for callers deciding how to report it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PayloadTooLarge,
    Decode,
    UnsupportedFormat,
    Processing,
    Timeout,
    InvalidConfig,
}

/// Error taxonomy for the background removal pipeline
///
/// Errors are cheap to clone so a single failed computation can be delivered to
/// every caller that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// Input exceeds the configured byte limit
    #[error("Payload too large: {size} bytes exceeds the limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Malformed or unsupported image bytes
    #[error("Decode error: {0}")]
    Decode(String),

    /// Requested output format cannot represent the image
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A pipeline stage failed
    #[error("Processing failed at stage '{stage}': {cause}")]
    Processing {
        stage: Stage,
        #[source]
        cause: ErrorCause,
    },

    /// A stage exceeded its allotted time
    #[error("Stage '{stage}' timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Plain message cause for stage failures that have no richer error value
#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

impl PipelineError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Wrap an underlying error as a failure of `stage`
    pub fn processing<E>(stage: Stage, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Processing {
            stage,
            cause: Arc::new(cause),
        }
    }

    /// Create processing error with stage context and a plain message
    pub fn processing_stage_error(stage: Stage, details: &str, input_info: Option<&str>) -> Self {
        let message = match input_info {
            Some(info) => format!("{} (input: {})", details, info),
            None => details.to_string(),
        };
        Self::Processing {
            stage,
            cause: Arc::new(Message(message)),
        }
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            Self::Decode(_) => ErrorKind::Decode,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Processing { .. } => ErrorKind::Processing,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Stage the error originated from, if it happened inside the pipeline
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Decode(_) => Some(Stage::Decode),
            Self::Processing { stage, .. } | Self::Timeout { stage, .. } => Some(*stage),
            Self::PayloadTooLarge { .. } | Self::UnsupportedFormat(_) | Self::InvalidConfig(_) => {
                None
            },
        }
    }
}
