//! Image codec service
//!
//! Decodes untrusted input bytes into canonical pixel buffers and re-encodes
//! results into a lossless, alpha-preserving PNG container. Backend output is
//! treated as untrusted too: it always passes through [`ImageCodec::decode_mask`]
//! before it reaches the compositor.

use crate::{
    error::{BgRemovalError, Result},
    types::{AlphaMask, CompositeImage, SourceImage},
    utils::TensorValidator,
};
use image::{codecs::png::PngEncoder, DynamicImage, ImageEncoder, ImageFormat, ImageReader};
use std::io::Cursor;

/// File name used for delivered results
pub const OUTPUT_FILE_NAME: &str = "no_bg.png";

/// MIME type of delivered results
pub const OUTPUT_MIME_TYPE: &str = "image/png";

/// Service for decoding inputs and encoding results
pub struct ImageCodec;

impl ImageCodec {
    /// Decode arbitrary image bytes into a 3-channel source image
    ///
    /// Any color type is converted to RGB8; the resolution is kept as encoded.
    ///
    /// # Errors
    /// - empty input
    /// - unrecognized or corrupt container (including truncated data)
    /// - zero or oversized dimensions
    pub fn decode(bytes: &[u8]) -> Result<SourceImage> {
        let image = Self::decode_dynamic(bytes)?;
        SourceImage::new(image.to_rgb8())
    }

    /// Decode backend output into a single-channel mask
    ///
    /// Images carrying an alpha channel contribute that channel; all other
    /// images contribute their luminance.
    ///
    /// # Errors
    /// Same as [`ImageCodec::decode`]. Callers report these as inference failures.
    pub fn decode_mask(bytes: &[u8]) -> Result<AlphaMask> {
        let image = Self::decode_dynamic(bytes)?;
        let dimensions = (image.width(), image.height());

        if image.color().has_alpha() {
            let alpha: Vec<u8> = image.to_rgba8().pixels().map(|p| p[3]).collect();
            AlphaMask::new(alpha, dimensions)
        } else {
            AlphaMask::from_gray(image.to_luma8())
        }
    }

    /// Encode an image with an alpha channel as PNG
    ///
    /// # Errors
    /// - the image has no alpha channel
    /// - the PNG encoder fails
    pub fn encode(image: &DynamicImage) -> Result<Vec<u8>> {
        if !image.color().has_alpha() {
            return Err(BgRemovalError::encode(format!(
                "Refusing to encode {:?} without an alpha channel",
                image.color()
            )));
        }

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut buffer = Vec::new();
        PngEncoder::new(Cursor::new(&mut buffer))
            .write_image(rgba.as_raw(), width, height, image::ExtendedColorType::Rgba8)
            .map_err(|e| BgRemovalError::encode(format!("PNG encoding failed: {}", e)))?;

        Ok(buffer)
    }

    /// Encode a composite result as PNG
    ///
    /// # Errors
    /// Same as [`ImageCodec::encode`].
    pub fn encode_composite(composite: CompositeImage) -> Result<Vec<u8>> {
        Self::encode(&composite.into_dynamic())
    }

    /// Guess the container format from magic bytes
    #[must_use]
    pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// MIME type for a sniffed format, falling back to a generic binary type
    #[must_use]
    pub fn mime_type(format: Option<ImageFormat>) -> &'static str {
        format.map_or("application/octet-stream", |f| f.to_mime_type())
    }

    fn decode_dynamic(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::decode("Image data is empty"));
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BgRemovalError::decode(format!("Failed to read image header: {}", e)))?;

        let format = reader.format().ok_or_else(|| {
            BgRemovalError::decode("Unrecognized image container (no known magic bytes)")
        })?;

        // The JPEG decoder pads missing scan data instead of failing
        if format == ImageFormat::Jpeg && !jpeg_has_end_marker(bytes) {
            return Err(BgRemovalError::decode(
                "Truncated Jpeg image: no end-of-image marker after the last scan",
            ));
        }

        let image = reader.decode().map_err(|e| {
            BgRemovalError::decode(format!("Failed to decode {:?} image: {}", format, e))
        })?;

        TensorValidator::validate_image_dimensions(image.width(), image.height())?;
        Ok(image)
    }
}

/// Whether an EOI marker follows the last start-of-scan marker
///
/// Entropy-coded data stuffs every `0xFF` byte, so `FF D9` after the final
/// `FF DA` can only be the real end of image. Embedded thumbnails precede the
/// main scans and trailing vendor data is tolerated.
fn jpeg_has_end_marker(bytes: &[u8]) -> bool {
    let last_scan = bytes
        .windows(2)
        .rposition(|pair| pair == [0xFF, 0xDA])
        .unwrap_or(0);
    bytes
        .get(last_scan..)
        .is_some_and(|tail| tail.windows(2).any(|pair| pair == [0xFF, 0xD9]))
}
