//! Core types flowing through the background removal pipeline

use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Utc};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Decoded input image, always 3-channel RGB with positive dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pixels: RgbImage,
}

impl SourceImage {
    /// Wrap an RGB buffer, rejecting zero-area images
    ///
    /// # Errors
    /// - width or height is zero
    pub fn new(pixels: RgbImage) -> Result<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(BgRemovalError::decode(format!(
                "Image has degenerate dimensions {}x{}",
                width, height
            )));
        }
        Ok(Self { pixels })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }
}

/// Single-channel foreground mask at the backend's native resolution
///
/// Each byte is the foreground probability scaled to `0..=255`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    /// Row-major mask values
    pub data: Vec<u8>,
    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl AlphaMask {
    /// Create a mask, checking that the buffer matches the dimensions
    ///
    /// # Errors
    /// - zero-area dimensions
    /// - buffer length differs from `width * height`
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Result<Self> {
        let (width, height) = dimensions;
        if width == 0 || height == 0 {
            return Err(BgRemovalError::internal(format!(
                "Mask has degenerate dimensions {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(BgRemovalError::internal(format!(
                "Mask buffer holds {} values, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { data, dimensions })
    }

    /// Quantize probabilities in `[0, 1]` into a byte mask
    ///
    /// Values outside the range are clamped, NaN maps to 0.
    ///
    /// # Errors
    /// Same as [`AlphaMask::new`].
    pub fn from_probabilities(values: &[f32], dimensions: (u32, u32)) -> Result<Self> {
        let data = values
            .iter()
            .map(|&p| {
                if p.is_nan() {
                    0
                } else {
                    (p.clamp(0.0, 1.0) * 255.0).round() as u8
                }
            })
            .collect();
        Self::new(data, dimensions)
    }

    /// Build a mask from a grayscale image
    ///
    /// # Errors
    /// Same as [`AlphaMask::new`].
    pub fn from_gray(gray: GrayImage) -> Result<Self> {
        let dimensions = gray.dimensions();
        Self::new(gray.into_raw(), dimensions)
    }

    /// Convert to a grayscale image buffer
    ///
    /// # Errors
    /// - internal buffer does not match the dimensions
    pub fn to_gray_image(&self) -> Result<GrayImage> {
        GrayImage::from_raw(self.dimensions.0, self.dimensions.1, self.data.clone())
            .ok_or_else(|| BgRemovalError::internal("Mask buffer does not match its dimensions"))
    }

    /// Resample the mask with bilinear filtering
    ///
    /// # Errors
    /// - target dimensions are zero
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if (width, height) == self.dimensions {
            return Ok(self.clone());
        }
        if width == 0 || height == 0 {
            return Err(BgRemovalError::internal(format!(
                "Cannot resize mask to {}x{}",
                width, height
            )));
        }
        let gray = self.to_gray_image()?;
        let resized = image::imageops::resize(&gray, width, height, FilterType::Triangle);
        Self::from_gray(resized)
    }

    /// Fraction of pixels considered foreground (value >= 128)
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let foreground = self.data.iter().filter(|&&v| v >= 128).count();
        foreground as f32 / self.data.len() as f32
    }
}

/// RGBA result image at the source resolution
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    pixels: RgbaImage,
}

impl CompositeImage {
    #[must_use]
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels)
    }
}

/// Per-stage timings of one pipeline run, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub inference_ms: u64,
    pub composite_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Percentages of total time spent in (decode, inference, composite, encode)
    #[must_use]
    pub fn breakdown_percentages(&self) -> (f64, f64, f64, f64) {
        if self.total_ms == 0 {
            return (0.0, 0.0, 0.0, 0.0);
        }
        let total = self.total_ms as f64;
        (
            self.decode_ms as f64 / total * 100.0,
            self.inference_ms as f64 / total * 100.0,
            self.composite_ms as f64 / total * 100.0,
            self.encode_ms as f64 / total * 100.0,
        )
    }
}

/// Ephemeral state of a single chat request
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id used in every log line of this request
    pub request_id: Uuid,
    /// Chat the request came from and the reply goes to
    pub chat_id: i64,
    /// Message carrying the image, if known
    pub message_id: Option<i64>,
    /// Wall-clock arrival time
    pub received_at: DateTime<Utc>,
    started: Instant,
}

impl RequestContext {
    #[must_use]
    pub fn new(chat_id: i64, message_id: Option<i64>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            chat_id,
            message_id,
            received_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Milliseconds since the request arrived
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
