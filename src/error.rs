//! Error types for the tiled-watermark crate.

use std::path::PathBuf;

/// Errors that can occur while preparing or applying a watermark.
///
/// [`crate::Watermarker::draw`] never returns these; it records them in its
/// error log and hands back the original path instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The reference could not be mapped to a local file.
    #[error("cannot resolve image source: {0:?}")]
    UnresolvableSource(String),

    /// The declared content type is not PNG, JPEG or WEBP.
    #[error("unsupported image encoding: {0}")]
    UnsupportedEncoding(String),

    /// The file could not be read or decoded.
    #[error("failed to decode {path}: {source}")]
    DecodeFailure {
        /// File that failed to decode.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// A raster copy could not be carried out.
    #[error("raster operation failed: {0}")]
    RasterOperationFailure(String),

    /// The result could not be encoded or written.
    #[error("failed to encode {path}: {source}")]
    EncodeFailure {
        /// Destination file.
        path: PathBuf,
        /// Underlying encoder error.
        source: image::ImageError,
    },

    /// A bitmap or watermark has a zero-sized dimension.
    #[error("invalid dimension {width}x{height}")]
    InvalidDimension {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
    },

    /// An I/O error occurred while managing output files or directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
