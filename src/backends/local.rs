//! Local mask backend
//!
//! Adapts a synchronous [`SegmentationModel`] to the async [`MaskBackend`]
//! contract: preprocessing, the forward pass and postprocessing all run on
//! the blocking thread pool so the polling loop and the health endpoint
//! stay responsive while a model is busy.

use crate::{
    config::MaskActivation,
    error::{BgRemovalError, Result},
    inference::{InferenceInput, MaskBackend, SegmentationModel},
    types::{AlphaMask, SourceImage},
    utils::{ImagePreprocessor, TensorValidator},
};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::Arc;
use tracing::instrument;

/// Mask backend running a segmentation model in-process
#[derive(Clone)]
pub struct LocalBackend {
    model: Arc<dyn SegmentationModel>,
    activation: MaskActivation,
}

impl LocalBackend {
    #[must_use]
    pub fn new(model: Arc<dyn SegmentationModel>, activation: MaskActivation) -> Self {
        Self { model, activation }
    }

    #[must_use]
    pub fn activation(&self) -> MaskActivation {
        self.activation
    }

    /// Run preprocessing, the forward pass and postprocessing synchronously
    ///
    /// # Errors
    /// - model failure or an output tensor that is not `[1, 1, H, W]`
    pub fn infer_blocking(
        model: &dyn SegmentationModel,
        activation: MaskActivation,
        image: &SourceImage,
    ) -> Result<AlphaMask> {
        let preprocessing = model.preprocessing_config();
        let input = ImagePreprocessor::preprocess_for_inference(image, &preprocessing)?;
        let output = model.forward(&input)?;
        Self::tensor_to_mask(&output, activation)
    }

    /// Convert a `[1, 1, H, W]` score tensor into a byte mask
    ///
    /// # Errors
    /// - unexpected tensor layout
    pub fn tensor_to_mask(output: &Array4<f32>, activation: MaskActivation) -> Result<AlphaMask> {
        let (height, width) = TensorValidator::validate_mask_tensor(output)?;

        let probabilities: Vec<f32> = output
            .iter()
            .map(|&score| match activation {
                MaskActivation::Sigmoid => sigmoid(score),
                MaskActivation::Identity => score,
            })
            .collect();

        let width = u32::try_from(width)
            .map_err(|_| BgRemovalError::inference("Mask width exceeds u32"))?;
        let height = u32::try_from(height)
            .map_err(|_| BgRemovalError::inference("Mask height exceeds u32"))?;
        AlphaMask::from_probabilities(&probabilities, (width, height))
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait]
impl MaskBackend for LocalBackend {
    #[instrument(skip(self, input), fields(model = %self.model.model_info().name))]
    async fn infer(&self, input: InferenceInput<'_>) -> Result<AlphaMask> {
        let model = Arc::clone(&self.model);
        let activation = self.activation;
        let image = input.image.clone();

        tokio::task::spawn_blocking(move || Self::infer_blocking(model.as_ref(), activation, &image))
            .await
            .map_err(|e| BgRemovalError::inference(format!("Inference task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{ConstantModel, FailingModel};
    use image::{Rgb, RgbImage};

    fn source(width: u32, height: u32) -> SourceImage {
        SourceImage::new(RgbImage::from_pixel(width, height, Rgb([120, 60, 30]))).unwrap()
    }

    #[test]
    fn test_tensor_to_mask_sigmoid() {
        let mut tensor = Array4::<f32>::zeros((1, 1, 1, 3));
        tensor[[0, 0, 0, 0]] = -20.0;
        tensor[[0, 0, 0, 2]] = 20.0;

        let mask = LocalBackend::tensor_to_mask(&tensor, MaskActivation::Sigmoid).unwrap();

        assert_eq!(mask.dimensions, (3, 1));
        assert_eq!(mask.data, vec![0, 128, 255]);
    }

    #[test]
    fn test_tensor_to_mask_identity_clamps() {
        let tensor =
            Array4::from_shape_vec((1, 1, 2, 2), vec![-1.0, 0.0, 0.5, 3.0]).unwrap();
        let mask = LocalBackend::tensor_to_mask(&tensor, MaskActivation::Identity).unwrap();
        assert_eq!(mask.data, vec![0, 0, 128, 255]);
    }

    #[test]
    fn test_tensor_to_mask_rejects_multichannel() {
        let tensor = Array4::<f32>::zeros((1, 3, 4, 4));
        let err = LocalBackend::tensor_to_mask(&tensor, MaskActivation::Identity).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[tokio::test]
    async fn test_infer_returns_mask_at_model_resolution() {
        let backend = LocalBackend::new(Arc::new(ConstantModel::new(32, 1.0)), MaskActivation::Identity);
        let image = source(100, 40);

        let mask = backend
            .infer(InferenceInput::new(&image, &[]))
            .await
            .unwrap();

        assert_eq!(mask.dimensions, (32, 32));
        assert!(mask.data.iter().all(|&v| v == 255));
        assert_eq!(backend.name(), "local");
    }

    #[tokio::test]
    async fn test_infer_propagates_model_failure() {
        let backend = LocalBackend::new(Arc::new(FailingModel), MaskActivation::Sigmoid);
        let image = source(8, 8);

        let err = backend
            .infer(InferenceInput::new(&image, &[]))
            .await
            .unwrap_err();

        assert!(matches!(err, BgRemovalError::Inference(_)));
    }
}
