//! Image preprocessing for local model inference
//!
//! Turns a [`SourceImage`] into the fixed-size, channel-normalized NCHW
//! tensor the segmentation model expects.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
    types::SourceImage,
};
use image::{imageops::FilterType, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Preprocess image for model inference
    ///
    /// This function handles:
    /// - Direct resize to the target size (bilinear, aspect ratio not kept)
    /// - Scaling to `[0, 1]` and per-channel normalization
    /// - NCHW layout with batch size 1
    ///
    /// # Errors
    /// - target size is zero
    pub fn preprocess_for_inference(
        image: &SourceImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let [target_width, target_height] = preprocessing_config.target_size;
        if target_width == 0 || target_height == 0 {
            return Err(BgRemovalError::internal(
                "Preprocessing target size must be positive",
            ));
        }

        let resized = if image.dimensions() == (target_width, target_height) {
            image.pixels().clone()
        } else {
            image::imageops::resize(
                image.pixels(),
                target_width,
                target_height,
                FilterType::Triangle,
            )
        };

        Ok(Self::canvas_to_tensor(&resized, preprocessing_config))
    }

    /// Convert canvas to normalized tensor
    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (x, y, pixel) in canvas.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] =
                    (f32::from(pixel[channel]) / 255.0 - mean[channel]) / std[channel];
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn create_test_image(width: u32, height: u32) -> SourceImage {
        SourceImage::new(RgbImage::from_pixel(width, height, Rgb([255, 0, 0]))).unwrap()
    }

    #[test]
    fn test_preprocess_for_inference_shape() {
        let image = create_test_image(100, 60);
        let config = PreprocessingConfig::default().with_target_size(64);

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);
    }

    #[test]
    fn test_normalization_values() {
        let image = create_test_image(8, 8);
        let config = PreprocessingConfig::default().with_target_size(8);

        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();

        let expected_r = (1.0 - 0.485) / 0.229;
        let expected_g = (0.0 - 0.456) / 0.224;
        let expected_b = (0.0 - 0.406) / 0.225;
        assert!((tensor[[0, 0, 3, 3]] - expected_r).abs() < 1e-5);
        assert!((tensor[[0, 1, 3, 3]] - expected_g).abs() < 1e-5);
        assert!((tensor[[0, 2, 3, 3]] - expected_b).abs() < 1e-5);
    }

    #[test]
    fn test_rejects_zero_target() {
        let image = create_test_image(4, 4);
        let mut config = PreprocessingConfig::default();
        config.target_size = [0, 4];
        assert!(ImagePreprocessor::preprocess_for_inference(&image, &config).is_err());
    }
}
