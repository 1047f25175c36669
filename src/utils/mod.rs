//! Stage helpers shared by the pipeline, benchmarks and tests

pub mod preprocessing;
pub mod validation;

pub use preprocessing::{EnhancementOptions, ImageEnhancer, ImageResizer};
pub use validation::InputValidator;
