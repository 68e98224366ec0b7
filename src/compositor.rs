//! Alpha compositing of a source image with a foreground mask

use crate::{
    error::{BgRemovalError, Result},
    types::{AlphaMask, CompositeImage, SourceImage},
};
use image::{Rgba, RgbaImage};

/// Merges a source image and a mask into an RGBA result
pub struct Compositor;

impl Compositor {
    /// Composite `mask` onto `image` as its alpha channel
    ///
    /// The mask is resampled to the source's exact dimensions with bilinear
    /// filtering; masks already at that size are used as-is. Color channels
    /// are copied from the source unchanged.
    ///
    /// # Errors
    /// - the mask has zero area or a buffer that does not match its dimensions
    pub fn composite(image: &SourceImage, mask: &AlphaMask) -> Result<CompositeImage> {
        let (mask_width, mask_height) = mask.dimensions;
        if mask_width == 0 || mask_height == 0 {
            return Err(BgRemovalError::internal("Cannot composite a zero-area mask"));
        }

        let (width, height) = image.dimensions();
        let alpha = mask.resize(width, height)?;
        let pixels = image.pixels();

        let mut rgba = RgbaImage::new(width, height);
        for ((dst, src), &a) in rgba
            .pixels_mut()
            .zip(pixels.pixels())
            .zip(alpha.data.iter())
        {
            *dst = Rgba([src[0], src[1], src[2], a]);
        }

        Ok(CompositeImage::new(rgba))
    }
}
