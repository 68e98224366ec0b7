//! Model metadata, preprocessing constants and model file loading

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// ImageNet channel means shared by preprocessing and the segmentation model
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed input resolution of the segmentation model
pub const DEFAULT_TARGET_SIZE: u32 = 1024;

/// Preprocessing parameters for turning a source image into a model tensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Target (width, height) of the model input
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to `[0, 1]`
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE],
            normalization_mean: IMAGENET_MEAN,
            normalization_std: IMAGENET_STD,
        }
    }
}

impl PreprocessingConfig {
    /// Same normalization with a different square input size
    #[must_use]
    pub fn with_target_size(mut self, size: u32) -> Self {
        self.target_size = [size, size];
        self
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// Location and integrity information of a local model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    /// Lowercase hex SHA-256 the file must match, if pinned
    pub expected_sha256: Option<String>,
}

impl ModelSpec {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            expected_sha256: None,
        }
    }

    #[must_use]
    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.expected_sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    /// Display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }

    /// Read the model bytes and verify the pinned digest
    ///
    /// # Errors
    /// - file missing or unreadable
    /// - file is empty
    /// - digest mismatch
    pub fn load_model_data(&self) -> Result<Vec<u8>> {
        let data = std::fs::read(&self.path).map_err(|e| {
            BgRemovalError::model_error_with_context(
                "read",
                &self.path,
                &e.to_string(),
                &["check MODEL_PATH", "verify file permissions"],
            )
        })?;

        if data.is_empty() {
            return Err(BgRemovalError::model_error_with_context(
                "load",
                &self.path,
                "file is empty",
                &[],
            ));
        }

        if let Some(expected) = &self.expected_sha256 {
            let actual = sha256_hex(&data);
            if &actual != expected {
                return Err(BgRemovalError::model_error_with_context(
                    "verify",
                    &self.path,
                    &format!("SHA-256 mismatch (expected {}, got {})", expected, actual),
                    &["re-download the model", "update MODEL_SHA256"],
                ));
            }
            log::debug!("Model checksum verified: {}", actual);
        }

        Ok(data)
    }
}

/// Hex-encoded SHA-256 digest
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Check that a path looks like an ONNX model file
#[must_use]
pub fn is_onnx_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"))
}
