//! Alpha blending math for translucent watermarks.
//!
//! Transparency is computed on a 7-bit scale where `0` is opaque and
//! [`MAX_TRANSPARENCY`] is fully transparent. Pixels are stored as RGBA8, so
//! every read and write goes through [`to_transparency`] and
//! [`from_transparency`].
//!
//! A pixel's new transparency is
//! `t + (MAX_TRANSPARENCY - t) / 101 * opacity`, rounded to two decimals.
//! The divisor of 101 means even `opacity = 100` stops short of full
//! transparency; existing watermarks were generated this way, so it is kept.

use image::RgbaImage;

/// Fully transparent on the 7-bit scale.
pub const MAX_TRANSPARENCY: u8 = 127;

/// Divisor of the blending formula.
const BLEND_DIVISOR: f64 = 101.0;

/// Opacity percentage applied to a watermark, always within `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpacityLevel(u8);

impl OpacityLevel {
    /// Smallest accepted level.
    pub const MIN: Self = Self(1);
    /// Largest accepted level.
    pub const MAX: Self = Self(100);

    /// Clamp a raw stored value into `1..=100`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn clamped(raw: i64) -> Self {
        Self(raw.clamp(1, 100) as u8)
    }

    /// The level as a percentage.
    #[must_use]
    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for OpacityLevel {
    fn default() -> Self {
        Self::MAX
    }
}

impl From<u8> for OpacityLevel {
    fn from(value: u8) -> Self {
        Self::clamped(i64::from(value))
    }
}

/// Convert an RGBA8 alpha byte (255 = opaque) into 7-bit transparency.
#[must_use]
pub fn to_transparency(alpha: u8) -> u8 {
    MAX_TRANSPARENCY - (alpha >> 1)
}

/// Convert 7-bit transparency back into an RGBA8 alpha byte.
///
/// Values above [`MAX_TRANSPARENCY`] saturate to fully transparent.
#[must_use]
pub fn from_transparency(transparency: u8) -> u8 {
    let t = transparency.min(MAX_TRANSPARENCY);
    255 - ((t << 1) + (t >> 6))
}

/// Transparency of a pixel after blending at `opacity`, rounded to two
/// decimals.
///
/// A pixel already at [`MAX_TRANSPARENCY`] is returned unchanged.
#[must_use]
pub fn blended_transparency(transparency: u8, opacity: OpacityLevel) -> f64 {
    if transparency >= MAX_TRANSPARENCY {
        return f64::from(transparency);
    }
    let t = f64::from(transparency);
    let headroom = f64::from(MAX_TRANSPARENCY - transparency);
    let value = t + headroom / BLEND_DIVISOR * f64::from(opacity.get());
    (value * 100.0).round() / 100.0
}

/// Produce a translucent copy of `source`.
///
/// Color channels are copied as-is. Only the alpha channel of pixels that
/// are not already fully transparent is rewritten; the 7-bit channel keeps
/// the integer part of [`blended_transparency`].
#[must_use]
pub fn blend(source: &RgbaImage, opacity: OpacityLevel) -> RgbaImage {
    let mut out = RgbaImage::new(source.width(), source.height());

    for (dst, src) in out
        .chunks_exact_mut(4)
        .zip(source.as_raw().chunks_exact(4))
    {
        dst[..3].copy_from_slice(&src[..3]);

        let transparency = to_transparency(src[3]);
        dst[3] = if transparency == MAX_TRANSPARENCY {
            src[3]
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let stored = blended_transparency(transparency, opacity) as u8;
            from_transparency(stored)
        };
    }

    out
}
