//! Input validation utilities
//!
//! Cheap checks that run before any decoding work is spent on a request.

use crate::error::{PipelineError, Result};

/// Validator for raw upload payloads
pub struct InputValidator;

impl InputValidator {
    /// Reject payloads larger than `limit` bytes
    ///
    /// # Errors
    /// - `PipelineError::PayloadTooLarge` when `size > limit`
    pub fn validate_payload_size(size: usize, limit: usize) -> Result<()> {
        if size > limit {
            return Err(PipelineError::PayloadTooLarge { size, limit });
        }
        Ok(())
    }

    /// Reject empty payloads with a decode error
    ///
    /// # Errors
    /// - `PipelineError::Decode` when `bytes` is empty
    pub fn validate_not_empty(bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Err(PipelineError::decode("empty input: no image data provided"));
        }
        Ok(())
    }
}
