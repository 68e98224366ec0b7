//! Tensor and dimension validation utilities

use crate::error::{BgRemovalError, Result};
use ndarray::Array4;

/// Largest accepted width or height of an input image
pub const MAX_DIMENSION: u32 = 16384;

/// Validator for tensor shapes and image bounds
pub struct TensorValidator;

impl TensorValidator {
    /// Validate that a model output is `[1, 1, H, W]` with positive spatial size
    ///
    /// # Errors
    /// - batch size or channel count differs from 1
    /// - zero height or width
    pub fn validate_mask_tensor(tensor: &Array4<f32>) -> Result<(usize, usize)> {
        let shape = tensor.shape();
        let dims = (
            shape.first().copied().unwrap_or(0),
            shape.get(1).copied().unwrap_or(0),
            shape.get(2).copied().unwrap_or(0),
            shape.get(3).copied().unwrap_or(0),
        );

        if dims.0 != 1 || dims.1 != 1 {
            return Err(BgRemovalError::inference(format!(
                "Model output must have batch size 1 and a single channel, got {:?}",
                shape
            )));
        }
        if dims.2 == 0 || dims.3 == 0 {
            return Err(BgRemovalError::inference(format!(
                "Model output has empty spatial dimensions {:?}",
                shape
            )));
        }

        Ok((dims.2, dims.3))
    }

    /// Validate image dimensions are within reasonable bounds
    ///
    /// # Errors
    /// - zero width or height
    /// - width or height above [`MAX_DIMENSION`]
    pub fn validate_image_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::decode(format!(
                "Image dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(BgRemovalError::decode(format!(
                "Image dimensions {}x{} exceed the maximum of {}",
                width, height, MAX_DIMENSION
            )));
        }
        Ok(())
    }
}
