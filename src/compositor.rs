//! Decoding, tiling, compositing and encoding of watermark layers.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::{imageops, ImageFormat, ImageReader, RgbaImage};

use crate::blending::{to_transparency, MAX_TRANSPARENCY};
use crate::error::{Error, Result};
use crate::tiling::{self, Offset};

/// How the watermark layer is laid onto the base image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlayMode {
    /// Raster copy: watermark pixels replace base pixels, except fully
    /// transparent ones which leave the base untouched.
    ///
    /// The watermark's alpha is copied too, so an opaque base pixel under a
    /// translucent watermark pixel comes out translucent. Use
    /// [`OverlayMode::Over`] when the output must stay opaque.
    #[default]
    Copy,
    /// Alpha-composite the watermark over the base.
    Over,
}

/// Map a file's declared type (its extension) to a supported decoder.
///
/// # Errors
///
/// Returns [`Error::UnsupportedEncoding`] for anything but PNG, JPEG or WEBP.
pub fn declared_format(path: &Path) -> Result<ImageFormat> {
    let declared = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ImageFormat::from_extension(&declared) {
        Some(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => Ok(format),
        _ => Err(Error::UnsupportedEncoding(if declared.is_empty() {
            path.display().to_string()
        } else {
            declared
        })),
    }
}

/// Decode a PNG, JPEG or WEBP file into an RGBA bitmap.
///
/// # Errors
///
/// Returns [`Error::UnsupportedEncoding`] for other types,
/// [`Error::DecodeFailure`] if the file cannot be read, and
/// [`Error::InvalidDimension`] for an empty bitmap.
pub fn decode(path: &Path) -> Result<RgbaImage> {
    let format = declared_format(path)?;

    let mut reader = ImageReader::open(path).map_err(|e| Error::DecodeFailure {
        path: path.to_path_buf(),
        source: image::ImageError::IoError(e),
    })?;
    reader.set_format(format);

    let bitmap = reader
        .decode()
        .map_err(|source| Error::DecodeFailure {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgba8();

    if bitmap.width() == 0 || bitmap.height() == 0 {
        return Err(Error::InvalidDimension {
            width: bitmap.width(),
            height: bitmap.height(),
        });
    }

    Ok(bitmap)
}

/// Write `bitmap` to `path` as PNG, whatever the path's extension.
///
/// # Errors
///
/// Returns [`Error::EncodeFailure`] if the file cannot be created or written.
pub fn encode_png(bitmap: &RgbaImage, path: &Path) -> Result<()> {
    bitmap
        .save_with_format(path, ImageFormat::Png)
        .map_err(|source| Error::EncodeFailure {
            path: path.to_path_buf(),
            source,
        })
}

/// Overwrite the existing file at `path` with `bitmap` as PNG.
///
/// The PNG is staged in a temporary file next to `path` and renamed over it
/// only once fully written, so a failed encode leaves the original intact.
///
/// # Errors
///
/// Returns [`Error::EncodeFailure`] if encoding fails, or [`Error::Io`] if
/// the staging file cannot be created or moved into place.
pub fn replace_with_png(bitmap: &RgbaImage, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    if let Ok(meta) = fs::metadata(path) {
        staged.as_file().set_permissions(meta.permissions())?;
    }

    let encode_failure = |source| Error::EncodeFailure {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(staged.as_file_mut());
    bitmap
        .write_to(&mut writer, ImageFormat::Png)
        .map_err(encode_failure)?;
    writer
        .flush()
        .map_err(|e| encode_failure(image::ImageError::IoError(e)))?;
    drop(writer);

    staged.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Copy `src` into `dst` with its top-left corner at `at`, clipped to `dst`.
///
/// With [`OverlayMode::Copy`], fully transparent source pixels are skipped.
///
/// # Errors
///
/// Returns [`Error::RasterOperationFailure`] if `at` lies outside `dst`.
pub fn copy_into(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    at: Offset,
    mode: OverlayMode,
) -> Result<()> {
    if at.x >= dst.width() || at.y >= dst.height() {
        return Err(Error::RasterOperationFailure(format!(
            "offset ({}, {}) outside {}x{} canvas",
            at.x,
            at.y,
            dst.width(),
            dst.height()
        )));
    }

    match mode {
        OverlayMode::Over => {
            imageops::overlay(dst, src, i64::from(at.x), i64::from(at.y));
        }
        OverlayMode::Copy => {
            let w = src.width().min(dst.width() - at.x);
            let h = src.height().min(dst.height() - at.y);
            for y in 0..h {
                for x in 0..w {
                    let px = *src.get_pixel(x, y);
                    if to_transparency(px[3]) == MAX_TRANSPARENCY {
                        continue;
                    }
                    dst.put_pixel(at.x + x, at.y + y, px);
                }
            }
        }
    }

    Ok(())
}

/// Grow `watermark` into a layer covering a `width x height` canvas.
///
/// A watermark that already covers the canvas is returned as-is; otherwise
/// it is tiled row by row onto a transparent canvas of the target size and
/// the original is dropped.
///
/// # Errors
///
/// Returns [`Error::InvalidDimension`] for an empty watermark or
/// [`Error::RasterOperationFailure`] if a tile cannot be placed.
pub fn tile_to_cover(watermark: RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
    let offsets = tiling::plan(width, height, watermark.width(), watermark.height())?;
    if offsets.is_empty() {
        return Ok(watermark);
    }

    tracing::debug!(
        tiles = offsets.len(),
        width,
        height,
        "tiling watermark to cover image"
    );

    let mut layer = RgbaImage::new(width, height);
    for at in offsets {
        copy_into(&mut layer, &watermark, at, OverlayMode::Copy)?;
    }

    Ok(layer)
}

/// Lay `watermark` over `base`, tiling it first when it is smaller than the
/// base in either direction.
///
/// # Errors
///
/// Returns [`Error::InvalidDimension`] or [`Error::RasterOperationFailure`]
/// when tiling or the final copy fails.
pub fn composite(
    mut base: RgbaImage,
    watermark: RgbaImage,
    mode: OverlayMode,
) -> Result<RgbaImage> {
    if base.width() == 0 || base.height() == 0 {
        return Err(Error::InvalidDimension {
            width: base.width(),
            height: base.height(),
        });
    }

    let layer = tile_to_cover(watermark, base.width(), base.height())?;
    copy_into(&mut base, &layer, Offset { x: 0, y: 0 }, mode)?;
    Ok(base)
}
