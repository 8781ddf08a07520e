//! Stamp a watermark over images, tiling it when it is smaller than the image.
//!
//! A watermark smaller than the target image in either direction is repeated
//! on a grid until it covers the whole canvas, then copied over the image
//! and the result is written as PNG. Watermarks can also be derived from an
//! opaque logo by pushing every pixel's alpha toward transparency.
//!
//! Drawing is fail-soft: [`Watermarker::draw`] always returns a usable path,
//! either the watermarked output or the untouched input, and records any
//! failure in [`Watermarker::error_logs`].
//!
//! # Quick Start
//!
//! ```no_run
//! use tiled_watermark::{Options, Watermarker, WatermarkSettings};
//!
//! let settings = WatermarkSettings {
//!     watermark: Some("/srv/site/upload/logo-translucent.png".into()),
//!     image: None,
//!     alpha_level: 40,
//! };
//! let mut engine =
//!     Watermarker::new(Options::default(), &settings).expect("failed to init engine");
//! let output = engine.draw("/srv/site/upload/photo.jpg");
//! println!("watermarked copy at {output}");
//! ```
//!
//! # Building blocks
//!
//! The tile geometry and the alpha math are usable on their own:
//!
//! ```
//! use tiled_watermark::{blending, tiling};
//!
//! let plan = tiling::plan(1000, 600, 400, 300).unwrap();
//! assert_eq!(plan.len(), 6);
//!
//! let t = blending::blended_transparency(0, blending::OpacityLevel::MAX);
//! assert!((t - 125.74).abs() < 1e-9);
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod compositor;
mod engine;
pub mod error;
pub mod source;
pub mod tiling;

pub use blending::OpacityLevel;
pub use compositor::OverlayMode;
pub use engine::{Options, OutputPolicy, Watermarker};
pub use error::{Error, Result};
pub use source::{LocalResolver, SettingsProvider, SourceResolver, WatermarkSettings};
