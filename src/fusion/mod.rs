//! Fusion: resample every lens through its projection and alignment field and blend the results
//! into one equirectangular frame.

use std::path::Path;

use crate::foundation::core::{Canvas, Timestamp};
use crate::foundation::error::{StitchError, StitchResult};

/// Per-pixel warp and blend.
pub mod engine;
/// Per-lens gain matching from the overlap band.
pub mod exposure;

/// One stitched canvas-sized frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PanoramicFrame {
    /// Sequence number of the frame set it was fused from.
    pub seq: u64,
    /// Presentation timestamp (the frame set's reference timestamp).
    pub pts: Timestamp,
    /// Canvas width.
    pub width: u32,
    /// Canvas height.
    pub height: u32,
    /// Opaque RGBA8 pixels, row-major.
    pub data: Vec<u8>,
}

impl PanoramicFrame {
    /// Canvas the frame covers.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// RGBA of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Copy into an [`image::RgbaImage`].
    pub fn to_rgba_image(&self) -> StitchResult<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            StitchError::configuration(format!(
                "panoramic frame {} buffer does not match {}x{}",
                self.seq, self.width, self.height
            ))
        })
    }

    /// Write the frame as a PNG (used for preview stills).
    pub fn save_png(&self, path: &Path) -> StitchResult<()> {
        use anyhow::Context as _;
        self.to_rgba_image()?
            .save_with_format(path, image::ImageFormat::Png)
            .with_context(|| format!("write preview '{}'", path.display()))?;
        Ok(())
    }
}
