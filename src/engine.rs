//! Watermarking engine: configuration, fail-soft drawing and output files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::blending::{self, OpacityLevel};
use crate::compositor::{self, OverlayMode};
use crate::error::{Error, Result};
use crate::source::{LocalResolver, SettingsProvider, SourceResolver, WatermarkSettings};

/// Where a watermarked image is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputPolicy {
    /// Write a new PNG into a fresh directory below [`Watermarker::temp_dir`].
    #[default]
    NewFile,
    /// Overwrite the resolved source file in place.
    Replace,
}

/// Options controlling the watermarking engine.
#[derive(Debug, Clone)]
pub struct Options {
    /// Root that relative references are resolved against.
    pub document_root: PathBuf,
    /// Directory for generated files, relative to `document_root`.
    pub base_dir: PathBuf,
    /// Output policy for [`Watermarker::draw`].
    pub output: OutputPolicy,
    /// How the watermark layer is applied.
    pub overlay: OverlayMode,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            document_root: PathBuf::from("."),
            base_dir: PathBuf::from("upload/watermark"),
            output: OutputPolicy::NewFile,
            overlay: OverlayMode::Copy,
        }
    }
}

/// Who is responsible for deleting a generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    /// The file existed before; nothing to track.
    Caller,
    /// A result handed to the caller, claimable via `persist_outputs`.
    Output,
    /// The engine's own translucent watermark, deleted on drop.
    Engine,
}

/// Result of one successful pipeline run.
#[derive(Debug)]
struct Drawn {
    path: PathBuf,
    owner: Owner,
}

/// A freshly created, uniquely named output directory.
///
/// Removed again on drop unless [`OutputDir::commit`] was called, so a
/// failed encode never leaves an orphaned directory behind.
struct OutputDir {
    path: PathBuf,
    committed: bool,
}

impl OutputDir {
    fn create(base: &Path) -> Result<Self> {
        let path = base.join(Uuid::new_v4().simple().to_string());
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    /// PNG destination named after `source`.
    fn file_for(&self, source: &Path) -> PathBuf {
        let stem = source.file_stem().unwrap_or_default().to_string_lossy();
        self.path.join(format!("{stem}.png"))
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputDir {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove output directory"
                );
            }
        }
    }
}

/// Applies the configured watermark to images.
///
/// Construct once and reuse for many images. Every file the engine creates
/// is deleted when it is dropped. Drawn outputs can be claimed with
/// [`Watermarker::persist_outputs`]; a watermark generated from a raw image
/// always goes with the engine.
pub struct Watermarker<R = LocalResolver> {
    options: Options,
    resolver: R,
    watermark: Option<PathBuf>,
    opacity: OpacityLevel,
    created: Vec<PathBuf>,
    prepared: Vec<PathBuf>,
    errors: HashMap<String, Error>,
}

impl Watermarker<LocalResolver> {
    /// Create an engine that resolves references against
    /// `options.document_root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the output directory cannot be created.
    pub fn new(options: Options, settings: &dyn SettingsProvider) -> Result<Self> {
        let resolver = LocalResolver::new(&options.document_root);
        Self::with_resolver(options, settings, resolver)
    }
}

impl<R: SourceResolver> Watermarker<R> {
    /// Create an engine with a custom source resolver.
    ///
    /// Resolves the watermark from `settings`. When only a raw watermark
    /// image is configured, a translucent variant is generated with
    /// [`Watermarker::create_image_alpha`] and handed to
    /// [`SettingsProvider::store_prepared`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the output directory cannot be created.
    pub fn with_resolver(
        options: Options,
        settings: &dyn SettingsProvider,
        resolver: R,
    ) -> Result<Self> {
        let WatermarkSettings {
            watermark,
            image,
            alpha_level,
        } = settings.watermark_settings();

        let mut engine = Self {
            options,
            resolver,
            watermark: None,
            opacity: OpacityLevel::clamped(alpha_level),
            created: Vec::new(),
            prepared: Vec::new(),
            errors: HashMap::new(),
        };

        if engine.options.output == OutputPolicy::NewFile {
            fs::create_dir_all(engine.temp_dir())?;
        }

        let reference = match (watermark, image) {
            (Some(prepared), _) if !prepared.is_empty() => prepared,
            (_, Some(raw)) if !raw.is_empty() => {
                let outcome = engine
                    .try_create_image_alpha(&raw, engine.opacity)
                    .map(|drawn| Drawn {
                        owner: Owner::Engine,
                        ..drawn
                    });
                let prepared = engine.record(&raw, outcome);
                if prepared != raw {
                    settings.store_prepared(Path::new(&prepared));
                }
                prepared
            }
            _ => String::new(),
        };

        engine.watermark = engine.resolver.resolve(&reference);
        tracing::debug!(
            watermark = ?engine.watermark,
            opacity = engine.opacity.get(),
            "watermark resolved"
        );

        Ok(engine)
    }

    /// Directory that receives generated files.
    #[must_use]
    pub fn temp_dir(&self) -> PathBuf {
        self.options.document_root.join(&self.options.base_dir)
    }

    /// Resolved watermark file, if any.
    #[must_use]
    pub fn watermark_path(&self) -> Option<&Path> {
        self.watermark.as_deref()
    }

    /// Configured opacity level.
    #[must_use]
    pub fn opacity(&self) -> OpacityLevel {
        self.opacity
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Apply the watermark to `image_path`.
    ///
    /// Returns the path of the watermarked PNG, or `image_path` unchanged
    /// when no watermark is configured or any step fails. Failures are
    /// recorded in [`Watermarker::error_logs`] under `image_path`.
    pub fn draw(&mut self, image_path: &str) -> String {
        let Some(watermark) = self.watermark.clone() else {
            return image_path.to_string();
        };
        let outcome = self.try_draw(image_path, &watermark);
        self.record(image_path, outcome)
    }

    /// Apply the watermark to every path in `paths`.
    ///
    /// Images are processed in parallel when the `cli` feature is enabled;
    /// each image still runs its pipeline sequentially. Results are returned
    /// in input order with the same fallback rules as [`Watermarker::draw`].
    pub fn draw_all<S: AsRef<str> + Sync>(&mut self, paths: &[S]) -> Vec<String> {
        let Some(watermark) = self.watermark.clone() else {
            return paths.iter().map(|p| p.as_ref().to_string()).collect();
        };

        let this = &*self;

        #[cfg(feature = "cli")]
        let outcomes: Vec<Result<Drawn>> = {
            use rayon::prelude::*;
            paths
                .par_iter()
                .map(|p| this.try_draw(p.as_ref(), &watermark))
                .collect()
        };

        #[cfg(not(feature = "cli"))]
        let outcomes: Vec<Result<Drawn>> = paths
            .iter()
            .map(|p| this.try_draw(p.as_ref(), &watermark))
            .collect();

        paths
            .iter()
            .zip(outcomes)
            .map(|(p, outcome)| self.record(p.as_ref(), outcome))
            .collect()
    }

    /// Write a translucent copy of the image at `filepath`.
    ///
    /// The copy is a PNG in a fresh directory below
    /// [`Watermarker::temp_dir`]. Returns its path, or `filepath` unchanged
    /// on failure.
    pub fn create_image_alpha(&mut self, filepath: &str, opacity: OpacityLevel) -> String {
        let outcome = self.try_create_image_alpha(filepath, opacity);
        self.record(filepath, outcome)
    }

    fn try_draw(&self, image_path: &str, watermark: &Path) -> Result<Drawn> {
        let full = self
            .resolver
            .resolve(image_path)
            .ok_or_else(|| Error::UnresolvableSource(image_path.to_string()))?;

        let base = compositor::decode(&full)?;
        let mark = compositor::decode(watermark)?;
        let result = compositor::composite(base, mark, self.options.overlay)?;

        match self.options.output {
            OutputPolicy::Replace => {
                compositor::replace_with_png(&result, &full)?;
                Ok(Drawn {
                    path: full,
                    owner: Owner::Caller,
                })
            }
            OutputPolicy::NewFile => {
                let dir = OutputDir::create(&self.temp_dir())?;
                let path = dir.file_for(&full);
                compositor::encode_png(&result, &path)?;
                dir.commit();
                Ok(Drawn {
                    path,
                    owner: Owner::Output,
                })
            }
        }
    }

    fn try_create_image_alpha(&self, filepath: &str, opacity: OpacityLevel) -> Result<Drawn> {
        let full = self
            .resolver
            .resolve(filepath)
            .ok_or_else(|| Error::UnresolvableSource(filepath.to_string()))?;

        let source = compositor::decode(&full)?;
        let translucent = blending::blend(&source, opacity);
        drop(source);

        let dir = OutputDir::create(&self.temp_dir())?;
        let path = dir.file_for(&full);
        compositor::encode_png(&translucent, &path)?;
        dir.commit();

        Ok(Drawn {
            path,
            owner: Owner::Output,
        })
    }

    fn record(&mut self, input: &str, outcome: Result<Drawn>) -> String {
        match outcome {
            Ok(drawn) => {
                tracing::debug!(input, output = %drawn.path.display(), "watermark applied");
                let out = drawn.path.to_string_lossy().into_owned();
                match drawn.owner {
                    Owner::Caller => {}
                    Owner::Output => self.created.push(drawn.path),
                    Owner::Engine => self.prepared.push(drawn.path),
                }
                out
            }
            Err(e) => {
                tracing::warn!(path = input, error = %e, "watermarking failed, keeping original");
                self.errors.insert(input.to_string(), e);
                input.to_string()
            }
        }
    }
}

impl<R> Watermarker<R> {
    /// Recorded failures, keyed by the path passed in.
    #[must_use]
    pub fn error_logs(&self) -> &HashMap<String, Error> {
        &self.errors
    }

    /// Recorded failure for one input path.
    #[must_use]
    pub fn error_log(&self, image_path: &str) -> Option<&Error> {
        self.errors.get(image_path)
    }

    /// Take ownership of every drawn output so it survives the engine.
    ///
    /// A watermark the engine generated for itself is not included.
    pub fn persist_outputs(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.created)
    }

    /// Delete every drawn output along with its directory.
    ///
    /// The engine's own generated watermark stays until the engine is
    /// dropped, so drawing can continue afterwards.
    pub fn cleanup(&mut self) {
        remove_generated(self.created.drain(..));
    }
}

impl<R> Drop for Watermarker<R> {
    fn drop(&mut self) {
        remove_generated(self.created.drain(..).chain(self.prepared.drain(..)));
    }
}

/// Delete generated files and their per-file directories.
fn remove_generated(paths: impl Iterator<Item = PathBuf>) {
    for path in paths {
        if !path.exists() {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete generated file");
            continue;
        }
        if let Some(dir) = path.parent() {
            if let Err(e) = fs::remove_dir(dir) {
                tracing::debug!(path = %dir.display(), error = %e, "output directory kept");
            }
        }
    }
}
