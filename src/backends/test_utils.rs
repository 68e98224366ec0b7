//! Test utilities and mock backends for testing inference functionality
//!
//! Mock implementations of [`SegmentationModel`] and [`MaskBackend`] so the
//! pipeline can be exercised without model files, ONNX Runtime or network access.

use crate::{
    error::{BgRemovalError, Result},
    inference::{InferenceInput, MaskBackend, SegmentationModel},
    models::{ModelInfo, PreprocessingConfig},
    types::AlphaMask,
};
use async_trait::async_trait;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Model emitting the same score everywhere at a fixed square resolution
#[derive(Debug, Clone)]
pub struct ConstantModel {
    size: u32,
    value: f32,
}

impl ConstantModel {
    #[must_use]
    pub fn new(size: u32, value: f32) -> Self {
        Self { size, value }
    }
}

impl SegmentationModel for ConstantModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let (_, _, height, width) = input.dim();
        Ok(Array4::from_elem((1, 1, height, width), self.value))
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig::default().with_target_size(self.size)
    }

    fn model_info(&self) -> ModelInfo {
        let size = self.size as usize;
        ModelInfo {
            name: "constant-model".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, size, size),
            output_shape: (1, 1, size, size),
        }
    }
}

/// Model whose forward pass always fails
#[derive(Debug, Clone, Copy)]
pub struct FailingModel;

impl SegmentationModel for FailingModel {
    fn forward(&self, _input: &Array4<f32>) -> Result<Array4<f32>> {
        Err(BgRemovalError::inference("Simulated model failure"))
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig::default().with_target_size(16)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "failing-model".to_string(),
            size_bytes: 0,
            input_shape: (1, 3, 16, 16),
            output_shape: (1, 1, 16, 16),
        }
    }
}

/// Behavior of a [`MockMaskBackend`]
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this mask
    Mask(AlphaMask),
    /// Fail with an inference error
    Fail,
    /// Sleep before answering with a fully opaque 1x1 mask
    Hang(Duration),
}

/// Mask backend with scripted behavior and a call counter
#[derive(Debug, Clone)]
pub struct MockMaskBackend {
    behavior: MockBehavior,
    calls: Arc<AtomicUsize>,
}

impl MockMaskBackend {
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend answering with a uniform mask of the given size and value
    pub fn uniform(width: u32, height: u32, value: u8) -> Self {
        let mask = AlphaMask {
            data: vec![value; width as usize * height as usize],
            dimensions: (width, height),
        };
        Self::new(MockBehavior::Mask(mask))
    }

    /// Number of `infer` calls observed so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MaskBackend for MockMaskBackend {
    async fn infer(&self, _input: InferenceInput<'_>) -> Result<AlphaMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Mask(mask) => Ok(mask.clone()),
            MockBehavior::Fail => Err(BgRemovalError::inference("Simulated backend failure")),
            MockBehavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                AlphaMask::new(vec![255], (1, 1))
            },
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
