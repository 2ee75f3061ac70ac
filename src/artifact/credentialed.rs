//! Credentialed-Upload artifact repository
//!
//! For managed storage (`dbfs:` artifact URIs) the tracking server hands out
//! a short-lived signed URL per destination path. The file is read into
//! memory and sent in one PUT, since chunked transfer encoding is rejected by
//! the object stores behind those URLs.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{file_dest, ArtifactRepo};
use crate::store::rest::protocol::{CredentialsForWrite, CredentialsForWriteResponse};
use crate::store::RestClient;
use crate::{Error, Result};

/// Largest file sent in a single PUT. Files of this size or larger are refused.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Uploads through signed URLs issued by the tracking server.
pub struct CredentialedRepo {
    client: Arc<RestClient>,
    run_id: String,
}

impl fmt::Debug for CredentialedRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialedRepo")
            .field("base_url", &self.client.base_url())
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl CredentialedRepo {
    /// Repository for the artifacts of `run_id`.
    pub fn new(client: Arc<RestClient>, run_id: impl Into<String>) -> Self {
        Self {
            client,
            run_id: run_id.into(),
        }
    }
}

fn read_bounded(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut body = Vec::new();
    file.take(MAX_UPLOAD_BYTES as u64)
        .read_to_end(&mut body)
        .map_err(|e| Error::io(path, e))?;
    if body.len() >= MAX_UPLOAD_BYTES {
        return Err(Error::Unsupported(format!(
            "file {} is too large (>= {MAX_UPLOAD_BYTES} bytes), chunked upload unimplemented",
            path.display()
        )));
    }
    Ok(body)
}

impl ArtifactRepo for CredentialedRepo {
    fn log_artifact(&self, local_file: &Path, dest_path: &str) -> Result<()> {
        let dest = file_dest(local_file, dest_path)?;
        let request = CredentialsForWrite {
            run_id: &self.run_id,
            path: vec![dest.as_str()],
        };
        let response: CredentialsForWriteResponse = self
            .client
            .post("artifacts/credentials-for-write", &request)?;
        let [credential] = response.credential_infos.as_slice() else {
            return Err(Error::Serialization(format!(
                "expected 1 write credential for {dest}, got {}",
                response.credential_infos.len()
            )));
        };

        let body = read_bounded(local_file)?;
        debug!(run_id = %self.run_id, %dest, bytes = body.len(), "uploading artifact");
        let headers: Vec<(String, String)> = credential
            .headers
            .iter()
            .map(|header| (header.name.clone(), header.value.clone()))
            .collect();
        self.client
            .put_signed(&credential.signed_uri, &headers, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bounded_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        std::fs::write(&path, b"hello").unwrap();
        assert_eq!(read_bounded(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_read_bounded_rejects_limit_sized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let file = File::create(&path).unwrap();
        file.set_len(MAX_UPLOAD_BYTES as u64).unwrap();
        let err = read_bounded(&path).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(err.to_string().contains("chunked upload unimplemented"));
    }
}
