//! Services separating I/O-shaped concerns from the pipeline logic
//!
//! - `codec`: image bytes ↔ bitmaps
//! - `format`: output format and download naming rules
//! - `progress`: stage-by-stage progress reporting

pub mod codec;
pub mod format;
pub mod progress;

pub use codec::{normalize, ImageCodec, StandardCodec};
pub use format::OutputFormatHandler;
pub use progress::{
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    TracingProgressReporter,
};
