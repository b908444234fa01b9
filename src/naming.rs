//! Output path generation.

use crate::errors::CameraError;
use crate::listener::ArtifactKind;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

// Shared by every namer so two namers in one process never collide.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates `<base>/<prefix><timestamp>-<sequence>.<ext>` paths.
#[derive(Debug, Clone, Default)]
pub struct ArtifactNamer {
    prefix: String,
}

impl ArtifactNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Next unused path under `base_dir`, creating the directory if needed.
    pub fn next_path(&self, base_dir: &Path, kind: ArtifactKind) -> Result<PathBuf, CameraError> {
        fs::create_dir_all(base_dir).map_err(|e| {
            CameraError::Io(format!(
                "Failed to create output directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S-%3f");
        let path = base_dir.join(format!(
            "{}{}-{:06}.{}",
            self.prefix,
            stamp,
            sequence,
            kind.extension()
        ));

        if path.exists() {
            log::error!("Generated artifact path already exists: {}", path.display());
            return Err(CameraError::NamingCollision(path));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_base_directory() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path().join("a").join("b");

        let path = ArtifactNamer::new().next_path(&base, ArtifactKind::Image).unwrap();
        assert!(base.is_dir());
        assert_eq!(path.parent(), Some(base.as_path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
    }

    #[test]
    fn sequential_paths_differ() {
        let root = tempfile::tempdir().unwrap();
        let namer = ArtifactNamer::with_prefix("vid-");
        let first = namer.next_path(root.path(), ArtifactKind::Video).unwrap();
        let second = namer.next_path(root.path(), ArtifactKind::Video).unwrap();

        assert_ne!(first, second);
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("vid-"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn base_directory_that_is_a_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        fs::write(&file, b"x").unwrap();

        let err = ArtifactNamer::new()
            .next_path(&file, ArtifactKind::Image)
            .unwrap_err();
        assert!(matches!(err, CameraError::Io(_)));
    }
}
