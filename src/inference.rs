//! Inference abstractions
//!
//! Two seams exist here:
//! - [`MaskBackend`]: the async, per-request contract the pipeline talks to.
//!   Implemented by the remote HTTP backend and by [`crate::backends::LocalBackend`].
//! - [`SegmentationModel`]: the synchronous tensor-in/tensor-out contract a
//!   local model runtime implements. [`crate::backends::LocalBackend`] wraps
//!   one and adds preprocessing, activation and quantization.

use crate::{
    error::Result,
    models::{ModelInfo, PreprocessingConfig},
    types::{AlphaMask, SourceImage},
};
use async_trait::async_trait;
use ndarray::Array4;

/// Input handed to a mask backend
///
/// Carries both the decoded image (for local preprocessing) and the original
/// bytes (forwarded as-is by the remote backend).
#[derive(Debug, Clone, Copy)]
pub struct InferenceInput<'a> {
    pub image: &'a SourceImage,
    pub raw_bytes: &'a [u8],
}

impl<'a> InferenceInput<'a> {
    #[must_use]
    pub fn new(image: &'a SourceImage, raw_bytes: &'a [u8]) -> Self {
        Self { image, raw_bytes }
    }
}

/// Produces a foreground mask for one image
///
/// Called exactly once per request. Implementations never retry and either
/// return a complete mask at their native resolution or an error.
#[async_trait]
pub trait MaskBackend: Send + Sync {
    /// Infer the foreground mask
    ///
    /// # Errors
    /// - backend unreachable, timed out, or answered with a non-success status
    /// - backend output is not a valid mask
    async fn infer(&self, input: InferenceInput<'_>) -> Result<AlphaMask>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Synchronous segmentation model over NCHW tensors
pub trait SegmentationModel: Send + Sync {
    /// Run one forward pass
    ///
    /// Input is `[1, 3, H, W]` normalized per [`SegmentationModel::preprocessing_config`].
    /// Output is the final-stage mask `[1, 1, H', W']`.
    ///
    /// # Errors
    /// - runtime failures
    /// - unexpected output layout
    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing the model expects
    fn preprocessing_config(&self) -> PreprocessingConfig;

    /// Model metadata
    fn model_info(&self) -> ModelInfo;
}
