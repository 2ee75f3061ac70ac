//! Artifact repositories
//!
//! A run uploads artifacts to the location named by its artifact URI. The
//! URI scheme picks the strategy:
//!
//! | Scheme            | Repository                         |
//! |-------------------|------------------------------------|
//! | none, `file`      | [`LocalCopyRepo`]: link or copy    |
//! | `dbfs`            | [`CredentialedRepo`]: signed PUT   |
//!
//! Destination paths are relative to the artifact root and always use `/`.

mod credentialed;
mod local;

pub use credentialed::{CredentialedRepo, MAX_UPLOAD_BYTES};
pub use local::LocalCopyRepo;

use std::path::{Component, Path};
use std::sync::Arc;

use reqwest::Url;
use walkdir::WalkDir;

use crate::store::file::validate_key;
use crate::store::RestClient;
use crate::{Error, Result};

/// Upload strategy for one artifact root.
pub trait ArtifactRepo {
    /// Upload one file to `dest_path` under the artifact root. An empty
    /// `dest_path` means the file's own name at the root.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or stored.
    fn log_artifact(&self, local_file: &Path, dest_path: &str) -> Result<()>;

    /// Upload every file below `local_dir`, keeping the directory's own name:
    /// `data/x/y.csv` logged under prefix `p` lands at `p/data/x/y.csv`.
    /// Empty directories produce nothing.
    ///
    /// # Errors
    ///
    /// Returns the first walk or upload failure; files already uploaded stay.
    fn log_artifacts(&self, local_dir: &Path, dest_prefix: &str) -> Result<()> {
        let base = local_dir.parent().unwrap_or_else(|| Path::new(""));
        for entry in WalkDir::new(local_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(local_dir).to_path_buf();
                Error::io(path, e.into())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let relative = entry.path().strip_prefix(base).unwrap_or(entry.path());
            let dest = join_dest(dest_prefix, &relative_artifact_path(relative));
            self.log_artifact(entry.path(), &dest)?;
        }
        Ok(())
    }
}

/// Repository selected from an artifact URI.
#[derive(Debug)]
pub enum ArtifactRepository {
    /// Local directory.
    LocalCopy(LocalCopyRepo),
    /// Managed storage reached through server-issued signed URLs.
    Credentialed(CredentialedRepo),
}

impl ArtifactRepository {
    /// Pick the repository for `artifact_uri`.
    ///
    /// `client` is the tracking server connection of the owning run; it is
    /// required for managed-storage URIs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] for an unknown scheme, or for a
    /// managed-storage URI without a tracking server connection.
    pub fn for_uri(
        artifact_uri: &str,
        run_id: &str,
        client: Option<Arc<RestClient>>,
    ) -> Result<Self> {
        let Ok(parsed) = Url::parse(artifact_uri) else {
            return Ok(Self::LocalCopy(LocalCopyRepo::new(artifact_uri)));
        };
        match parsed.scheme() {
            "file" => {
                let root = parsed
                    .to_file_path()
                    .map_err(|()| Error::Validation(format!("invalid file URI {artifact_uri}")))?;
                Ok(Self::LocalCopy(LocalCopyRepo::new(root)))
            }
            "dbfs" => match client {
                Some(client) => Ok(Self::Credentialed(CredentialedRepo::new(client, run_id))),
                None => Err(Error::Unsupported(format!(
                    "artifact location {artifact_uri} needs a tracking server connection"
                ))),
            },
            scheme if scheme.len() == 1 => Ok(Self::LocalCopy(LocalCopyRepo::new(artifact_uri))),
            scheme => Err(Error::Unsupported(format!(
                "artifact repository with URI scheme {scheme} not implemented"
            ))),
        }
    }

    fn inner(&self) -> &dyn ArtifactRepo {
        match self {
            Self::LocalCopy(repo) => repo,
            Self::Credentialed(repo) => repo,
        }
    }

    /// Upload a file, or every file below a directory.
    ///
    /// # Errors
    ///
    /// Returns error if `local_path` does not exist or an upload fails.
    pub fn log_path(&self, local_path: &Path, dest_path: &str) -> Result<()> {
        let metadata = std::fs::metadata(local_path).map_err(|e| Error::io(local_path, e))?;
        if metadata.is_dir() {
            self.log_artifacts(local_path, dest_path)
        } else {
            self.log_artifact(local_path, dest_path)
        }
    }
}

impl ArtifactRepo for ArtifactRepository {
    fn log_artifact(&self, local_file: &Path, dest_path: &str) -> Result<()> {
        self.inner().log_artifact(local_file, dest_path)
    }

    fn log_artifacts(&self, local_dir: &Path, dest_prefix: &str) -> Result<()> {
        self.inner().log_artifacts(local_dir, dest_prefix)
    }
}

/// `/`-separated form of a relative path, dropping `.` and root components.
fn relative_artifact_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_dest(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{prefix}/{relative}")
    }
}

/// Destination for a single file: `dest_path`, or the file name when empty.
/// The result never leaves the artifact root.
fn file_dest(local_file: &Path, dest_path: &str) -> Result<String> {
    let dest_path = dest_path.trim_matches('/');
    let dest = if dest_path.is_empty() {
        local_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::Validation(format!("{} has no file name", local_file.display()))
            })?
    } else {
        dest_path.to_string()
    };
    validate_key("artifact path", &dest)?;
    Ok(dest)
}
