//! Tile geometry: how many watermark copies cover an image, and where.

use crate::error::{Error, Result};

/// Top-left corner of one watermark tile on the base canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    /// Horizontal position in pixels.
    pub x: u32,
    /// Vertical position in pixels.
    pub y: u32,
}

/// Ordered tile placements, row-major. Empty when no tiling is needed.
pub type TilePlan = Vec<Offset>;

/// Compute the offsets needed to cover an `image_width x image_height`
/// canvas with a `watermark_width x watermark_height` tile.
///
/// Returns an empty plan when a single watermark already reaches (or
/// exceeds) the image in both directions. Offsets are not clipped: the last
/// column and row may hang past the canvas edge.
///
/// # Errors
///
/// Returns [`Error::InvalidDimension`] if the watermark has a zero dimension.
pub fn plan(
    image_width: u32,
    image_height: u32,
    watermark_width: u32,
    watermark_height: u32,
) -> Result<TilePlan> {
    if watermark_width == 0 || watermark_height == 0 {
        return Err(Error::InvalidDimension {
            width: watermark_width,
            height: watermark_height,
        });
    }

    let tiles_x = image_width.div_ceil(watermark_width);
    let tiles_y = image_height.div_ceil(watermark_height);

    if tiles_x <= 1 && tiles_y <= 1 {
        return Ok(Vec::new());
    }

    // Neither product can overflow: the last tile starts below the image edge.
    let mut offsets = Vec::with_capacity((tiles_x as usize) * (tiles_y as usize));
    for y in 0..tiles_y {
        for x in 0..tiles_x {
            offsets.push(Offset {
                x: watermark_width * x,
                y: watermark_height * y,
            });
        }
    }

    Ok(offsets)
}
