//! Test utilities and mock removers for pipeline unit tests
//!
//! The mocks record how often they were invoked so tests can verify caching
//! and single-flight behavior without a real model.

use crate::{
    error::{PipelineError, Result, Stage},
    remover::{BackgroundRemover, MattingParams},
};
use async_trait::async_trait;
use image::RgbaImage;
use instant::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

/// What the mock remover does when called
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Set every pixel's alpha to the given value
    ConstantAlpha(u8),
    /// Keep the left half opaque and clear the right half
    SplitAlpha,
    /// Fail with a processing error
    Fail(String),
    /// Return an image of the wrong size
    WrongSize,
}

/// Mock background remover for testing
#[derive(Debug, Clone)]
pub struct MockRemover {
    behavior: MockBehavior,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
    seen_params: Arc<Mutex<Vec<MattingParams>>>,
}

impl MockRemover {
    /// Mock that returns fully opaque output
    #[must_use]
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::ConstantAlpha(255))
    }

    #[must_use]
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_params: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self::with_behavior(MockBehavior::Fail(message.to_string()))
    }

    /// Sleep (in tokio time) before answering
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `remove` calls so far, shared between clones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_params(&self) -> Vec<MattingParams> {
        self.seen_params.lock().unwrap().clone()
    }
}

impl Default for MockRemover {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundRemover for MockRemover {
    async fn remove(&self, mut image: RgbaImage, params: MattingParams) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_params.lock().unwrap().push(params);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            MockBehavior::ConstantAlpha(alpha) => {
                for pixel in image.pixels_mut() {
                    pixel.0[3] = *alpha;
                }
                Ok(image)
            },
            MockBehavior::SplitAlpha => {
                let half = image.width() / 2;
                for (x, _, pixel) in image.enumerate_pixels_mut() {
                    pixel.0[3] = if x < half { 255 } else { 0 };
                }
                Ok(image)
            },
            MockBehavior::Fail(message) => Err(PipelineError::processing_stage_error(
                Stage::RemoveBackground,
                message,
                None,
            )),
            MockBehavior::WrongSize => Ok(RgbaImage::new(image.width() + 1, image.height())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_remover_counts_calls() {
        let mock = MockRemover::new();
        let clone = mock.clone();
        let out = clone
            .remove(RgbaImage::new(2, 2), MattingParams::default())
            .await
            .unwrap();
        assert!(out.pixels().all(|p| p.0[3] == 255));
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.seen_params(), vec![MattingParams::default()]);
    }

    #[tokio::test]
    async fn test_mock_remover_failure() {
        let mock = MockRemover::failing("model crashed");
        let err = mock
            .remove(RgbaImage::new(1, 1), MattingParams::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model crashed"));
    }
}
