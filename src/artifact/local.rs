//! Local-Copy artifact repository

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{file_dest, ArtifactRepo};
use crate::{Error, Result};

/// Stores artifacts under a local directory.
///
/// Each file is hard-linked into place when possible and copied otherwise.
/// An existing destination file is replaced, never written through.
#[derive(Debug, Clone)]
pub struct LocalCopyRepo {
    root_dir: PathBuf,
}

impl LocalCopyRepo {
    /// Repository rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Artifact root directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

impl ArtifactRepo for LocalCopyRepo {
    fn log_artifact(&self, local_file: &Path, dest_path: &str) -> Result<()> {
        let target = self.root_dir.join(file_dest(local_file, dest_path)?);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        if target.is_file() {
            fs::remove_file(&target).map_err(|e| Error::io(&target, e))?;
        }
        if let Err(link_err) = fs::hard_link(local_file, &target) {
            debug!(
                source = %local_file.display(),
                target = %target.display(),
                error = %link_err,
                "hard link failed, copying"
            );
            fs::copy(local_file, &target).map_err(|e| Error::io(local_file, e))?;
        }
        Ok(())
    }
}
