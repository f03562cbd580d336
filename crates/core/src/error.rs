//! Unified error types for tracelabel.
//!
//! Every fault the pipeline can hit reduces to one of these variants. The
//! labeling path logs and swallows them; archival and filtering surface them
//! to their caller.

use std::io;
use std::path::{Path, PathBuf};

use tokio_rusqlite::rusqlite;

/// Unified error types for the request labeling pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connect, auth, timeout or transport fault against the shared store.
    #[error("STORE_UNAVAILABLE: {0}")]
    StoreUnavailable(String),

    /// Archive or filter target could not be read or written.
    #[error("FILE_ACCESS_DENIED: {}: {source}", path.display())]
    FileAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stored dependency snapshot is not a JSON array of paths.
    #[error("MALFORMED_SNAPSHOT: {0}")]
    MalformedSnapshot(String),

    /// Record could not be encoded for storage.
    #[error("SERIALIZATION_FAILED: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration failed to apply.
    #[error("STORE_UNAVAILABLE: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Wrap an I/O failure on `path`.
    pub fn file_access(path: &Path, source: io::Error) -> Self {
        Error::FileAccessDenied { path: path.to_path_buf(), source }
    }

    /// Whether this fault came from the shared store rather than the local filesystem.
    pub fn is_store_fault(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::MigrationFailed(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            other => Error::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Error::StoreUnavailable(format!("timed out: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::StoreUnavailable("connection refused".to_string());
        assert!(err.to_string().contains("STORE_UNAVAILABLE"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_file_access_display_includes_path() {
        let err = Error::file_access(
            Path::new("/var/log/requests.log"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("FILE_ACCESS_DENIED"));
        assert!(msg.contains("/var/log/requests.log"));
        assert!(!err.is_store_fault());
    }

    #[test]
    fn test_rusqlite_error_is_store_fault() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_store_fault());
    }
}
