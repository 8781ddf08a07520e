//! Collaborators that supply the watermark configuration and locate files.

use std::path::{Path, PathBuf};

/// Watermark configuration as stored by the content backend.
///
/// `watermark` names a prepared, already translucent watermark. When it is
/// missing, `image` names a raw opaque image from which a translucent
/// variant is generated at `alpha_level` percent. When both are missing no
/// watermark is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatermarkSettings {
    /// Prepared translucent watermark reference.
    pub watermark: Option<String>,
    /// Raw watermark image reference.
    pub image: Option<String>,
    /// Stored opacity, clamped into `1..=100` on use.
    pub alpha_level: i64,
}

/// Source of the active watermark configuration.
pub trait SettingsProvider {
    /// Fetch the current watermark settings.
    fn watermark_settings(&self) -> WatermarkSettings;

    /// Persist a freshly generated translucent watermark so that later runs
    /// can use it directly. The default implementation keeps nothing.
    fn store_prepared(&self, _path: &Path) {}
}

impl SettingsProvider for WatermarkSettings {
    fn watermark_settings(&self) -> WatermarkSettings {
        self.clone()
    }
}

/// Maps an image reference to a file on the local filesystem.
pub trait SourceResolver: Send + Sync {
    /// Resolve `reference`, or `None` if it cannot name a local file.
    fn resolve(&self, reference: &str) -> Option<PathBuf>;
}

/// Resolves references against a document root, then as plain paths.
#[derive(Debug, Clone)]
pub struct LocalResolver {
    document_root: PathBuf,
}

impl LocalResolver {
    /// Create a resolver rooted at `document_root`.
    #[must_use]
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
        }
    }
}

impl SourceResolver for LocalResolver {
    /// Lookup order: an existing file under the document root, then the
    /// reference itself unless it names a directory.
    fn resolve(&self, reference: &str) -> Option<PathBuf> {
        if reference.is_empty() {
            return None;
        }

        let rooted = self.document_root.join(reference.trim_start_matches('/'));
        if rooted.is_file() {
            return Some(rooted);
        }

        let plain = PathBuf::from(reference);
        if plain.is_dir() {
            None
        } else {
            Some(plain)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_reference_is_unresolvable() {
        let resolver = LocalResolver::new("/");
        assert_eq!(resolver.resolve(""), None);
    }

    #[test]
    fn rooted_file_wins_over_plain_path() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("upload")).unwrap();
        std::fs::write(root.path().join("upload/cat.png"), b"x").unwrap();

        let resolver = LocalResolver::new(root.path());
        assert_eq!(
            resolver.resolve("/upload/cat.png"),
            Some(root.path().join("upload/cat.png"))
        );
    }

    #[test]
    fn unknown_reference_falls_back_to_plain_path() {
        let root = tempfile::tempdir().unwrap();
        let resolver = LocalResolver::new(root.path());
        assert_eq!(
            resolver.resolve("/nowhere/dog.jpg"),
            Some(PathBuf::from("/nowhere/dog.jpg"))
        );
    }

    #[test]
    fn directories_are_unresolvable() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("upload")).unwrap();
        let resolver = LocalResolver::new("/var/empty/root");

        let dir = root.path().join("upload");
        assert_eq!(resolver.resolve(&dir.display().to_string()), None);
    }

    #[test]
    fn settings_serve_themselves() {
        let settings = WatermarkSettings {
            watermark: Some("/wm.png".into()),
            image: None,
            alpha_level: 40,
        };
        assert_eq!(settings.watermark_settings(), settings);
    }
}
