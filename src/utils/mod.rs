//! Shared utilities for preprocessing and validation

pub mod preprocessing;
pub mod validation;

pub use preprocessing::ImagePreprocessor;
pub use validation::{TensorValidator, MAX_DIMENSION};
