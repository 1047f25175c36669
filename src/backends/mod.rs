//! Background remover implementations
//!
//! - `border_key`: keys out the average border color (no model files needed)
//!
//! Model-backed removers live outside this crate and plug in through
//! [`BackgroundRemover`](crate::remover::BackgroundRemover).

pub mod border_key;

// Test utilities for remover testing
#[cfg(test)]
pub mod test_utils;

pub use self::border_key::BorderKeyRemover;
