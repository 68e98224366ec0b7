//! ONNX Runtime segmentation model
//!
//! Loads a salient-object segmentation model (BiRefNet family) once at startup
//! and runs forward passes for [`crate::backends::LocalBackend`]. The ort
//! session needs exclusive access to run, so forward passes are serialized
//! through a mutex.

use crate::config::{ExecutionProvider, LocalInferenceConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::SegmentationModel;
use crate::models::{is_onnx_path, ModelInfo, ModelSpec, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::sync::Mutex;
use std::time::Instant;

/// Segmentation model backed by an ONNX Runtime session
#[derive(Debug)]
pub struct OnnxModel {
    session: Mutex<Session>,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl OnnxModel {
    /// List execution providers with availability status and descriptions
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Load the model described by the local inference configuration
    ///
    /// # Errors
    /// - no model path configured, or the file is missing, empty or fails its checksum
    /// - ONNX Runtime rejects the model
    pub fn load(config: &LocalInferenceConfig) -> Result<Self> {
        let path = config.model_path.as_ref().ok_or_else(|| {
            BgRemovalError::missing_env("MODEL_PATH", "required for the local backend")
        })?;
        if !is_onnx_path(path) {
            log::warn!(
                "Model path {} has no .onnx extension, loading anyway",
                path.display()
            );
        }

        let mut spec = ModelSpec::new(path);
        if let Some(digest) = &config.expected_sha256 {
            spec = spec.with_sha256(digest.clone());
        }

        let model_load_start = Instant::now();
        let model_data = spec.load_model_data()?;
        let preprocessing = PreprocessingConfig::default();
        let session = Self::build_session(config, &model_data)
            .map_err(|e| BgRemovalError::model_error_with_context("load", path, &e.to_string(), &[]))?;

        let [width, height] = preprocessing.target_size;
        let info = ModelInfo {
            name: spec.display_name(),
            size_bytes: model_data.len(),
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        };

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "Model {} loaded in {:.0}ms ({:.2} MB, provider {})",
            info.name,
            model_load_start.elapsed().as_secs_f64() * 1000.0,
            size_mb,
            config.execution_provider
        );

        Ok(Self {
            session: Mutex::new(session),
            info,
            preprocessing,
        })
    }

    fn build_session(config: &LocalInferenceConfig, model_data: &[u8]) -> Result<Session> {
        let mut session_builder = Session::builder()
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if providers.is_empty() {
            log::info!("Using CPU execution provider");
        } else {
            session_builder = session_builder
                .with_execution_providers(providers)
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to set execution providers: {e}"))
                })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };
        log::debug!("Session threading: {intra_threads} intra-op threads");

        session_builder
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| {
                BgRemovalError::inference(format!("Failed to create session from model data: {e}"))
            })
    }

    /// Hardware providers to register, in priority order; empty means CPU
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match requested {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::warn!("No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cpu => {},
            ExecutionProvider::Cuda => {
                if cuda_available {
                    providers.push(cuda.build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    providers.push(coreml.build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }
        providers
    }
}

impl SegmentationModel for OnnxModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input.clone()).map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| BgRemovalError::internal("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        // Multi-scale models list the final-stage prediction first
        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
        let output_tensor = output_value
            .try_extract_array::<f32>()
            .map_err(|e| BgRemovalError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        let data = output_tensor.iter().copied().collect::<Vec<f32>>();
        let dims = match shape.as_slice() {
            [n, c, h, w] => (*n, *c, *h, *w),
            [n, h, w] => (*n, 1, *h, *w),
            _ => {
                return Err(BgRemovalError::inference(format!(
                    "Expected 3D or 4D output tensor, got shape {:?}",
                    shape
                )))
            },
        };

        let result = Array4::from_shape_vec(dims, data).map_err(|e| {
            BgRemovalError::inference(format!("Failed to reshape output tensor: {e}"))
        })?;

        log::info!(
            "Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(result)
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing
    }

    fn model_info(&self) -> ModelInfo {
        self.info.clone()
    }
}
