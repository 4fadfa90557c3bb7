//! Fetched source artifacts

use crate::types::SourceKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Layout of a fetched artifact on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Checked-out directory tree
    Directory,
    /// Zip archive file
    Zip,
    /// Gzipped tarball file
    TarGz,
}

impl From<SourceKind> for ArtifactFormat {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Git => ArtifactFormat::Directory,
            SourceKind::Zip => ArtifactFormat::Zip,
            SourceKind::Tar => ArtifactFormat::TarGz,
        }
    }
}

/// Handle to a fetched plugin source
///
/// Keeps the provider's scratch directory alive until the last clone is
/// dropped, so the host store can copy from `path` at its own pace.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    format: ArtifactFormat,
    path: PathBuf,
    origin: String,
    workdir: Option<Arc<TempDir>>,
}

impl SourceArtifact {
    /// Artifact living inside a provider-owned scratch directory
    pub fn in_workdir(
        format: ArtifactFormat,
        path: impl Into<PathBuf>,
        origin: impl Into<String>,
        workdir: TempDir,
    ) -> Self {
        Self {
            format,
            path: path.into(),
            origin: origin.into(),
            workdir: Some(Arc::new(workdir)),
        }
    }

    /// Artifact at a path the caller owns
    pub fn at_path(
        format: ArtifactFormat,
        path: impl Into<PathBuf>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            format,
            path: path.into(),
            origin: origin.into(),
            workdir: None,
        }
    }

    /// On-disk layout
    pub fn format(&self) -> ArtifactFormat {
        self.format
    }

    /// Directory or archive file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URL the artifact was fetched from
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workdir_lives_with_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let artifact =
            SourceArtifact::in_workdir(ArtifactFormat::Directory, &root, "https://x/y.git", dir);

        let clone = artifact.clone();
        drop(artifact);
        assert!(clone.path().exists());

        drop(clone);
        assert!(!root.exists());
    }

    #[test]
    fn test_format_from_kind() {
        assert_eq!(ArtifactFormat::from(SourceKind::Git), ArtifactFormat::Directory);
        assert_eq!(ArtifactFormat::from(SourceKind::Tar), ArtifactFormat::TarGz);
    }
}
