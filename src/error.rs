//! Error types for the tracking client
//!
//! Every error carries enough context (path, HTTP status, response body) to
//! diagnose the failure without re-running it.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Tracking client error types
#[derive(Error, Debug)]
pub enum Error {
    /// Mutation rejected: experiment not active, run not running, bad key
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing experiment, run, param or tag
    #[error("Not found: {0}")]
    NotFound(String),

    /// URI scheme, search filter or upload size this client cannot handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Network failure or non-success HTTP response
    #[error("Transport error: {message}{}{}", format_status(.status), format_body(.body))]
    Transport {
        /// What was being attempted (method and URL)
        message: String,
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Response body text, possibly empty
        body: String,
    },

    /// Malformed persisted metadata or wire payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem error with the path that caused it
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

fn format_status(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" (status {s})"))
}

fn format_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl Error {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Transport failure without an HTTP response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            body: String::new(),
        }
    }

    /// HTTP status code, for transport errors that received a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// True for [`Error::NotFound`], including IO not-found errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = err.url().map_or_else(
            || err.to_string(),
            |url| format!("request to {url} failed: {err}"),
        );
        Self::Transport {
            message,
            status: err.status().map(|s| s.as_u16()),
            body: String::new(),
        }
    }
}
