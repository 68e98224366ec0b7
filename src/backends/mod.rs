//! Mask backend implementations
//!
//! - Remote backend (HTTP inference endpoint)
//! - Local backend (any [`crate::inference::SegmentationModel`] run in-process)
//! - ONNX Runtime model for the local backend

pub mod local;
pub mod remote;

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

pub use self::local::LocalBackend;
pub use self::remote::RemoteBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxModel;
