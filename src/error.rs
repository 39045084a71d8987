//! Error types for MirrorCopy
//!
//! This module defines the error taxonomy of a mirror run. Terminal errors
//! stop the run before or at the start of the copy pass; per-entry errors are
//! collected in [`crate::core::CopyResult`] and never abort the pass, except
//! for [`MirrorCopyError::CatastrophicIo`].

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for MirrorCopy operations
#[derive(Error, Debug)]
pub enum MirrorCopyError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No source path was given (the run is a silent no-op)
    #[error("No source folder given")]
    EmptyInput,

    /// Source path is missing or is not a directory
    #[error("Invalid source '{path}': {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    /// Destination folder already exists and will not be overwritten
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// Destination would be created inside the tree being copied
    #[error("Destination '{destination}' is inside source '{source_path}'")]
    DestinationInsideSource {
        source_path: PathBuf,
        destination: PathBuf,
    },

    /// A single entry could not be copied
    #[error("{path}: {source}")]
    PerEntryCopyFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content was copied but some attributes could not be preserved
    #[error("{path}: could not preserve {details}")]
    AttributeCopyFailed { path: PathBuf, details: String },

    /// Destination volume failure that ends the copy pass
    #[error("Fatal I/O error at '{path}': {source}")]
    CatastrophicIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl MirrorCopyError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create an invalid source error
    pub fn invalid_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify an I/O failure on a single entry.
    ///
    /// Failures that mean the destination volume can no longer accept
    /// writes become [`MirrorCopyError::CatastrophicIo`]; everything else is
    /// a recoverable [`MirrorCopyError::PerEntryCopyFailure`].
    pub fn entry(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if is_volume_failure(&source) {
            Self::CatastrophicIo { path, source }
        } else {
            Self::PerEntryCopyFailure { path, source }
        }
    }

    /// Errors that end a run before any per-entry work is reported
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput
                | Self::InvalidSource { .. }
                | Self::DestinationExists(_)
                | Self::DestinationInsideSource { .. }
                | Self::CatastrophicIo { .. }
                | Self::ConfigError(_)
        )
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. }
            | Self::InvalidSource { path, .. }
            | Self::DestinationExists(path)
            | Self::PerEntryCopyFailure { path, .. }
            | Self::AttributeCopyFailed { path, .. }
            | Self::CatastrophicIo { path, .. } => Some(path),
            Self::DestinationInsideSource { destination, .. } => Some(destination),
            _ => None,
        }
    }
}

/// Result type alias for MirrorCopy operations
pub type Result<T> = std::result::Result<T, MirrorCopyError>;

/// A failure recorded against one entry of the tree
#[derive(Debug)]
pub struct EntryError {
    /// Path relative to the tree root
    pub relative_path: PathBuf,
    /// What went wrong
    pub error: MirrorCopyError,
}

impl EntryError {
    /// Record an error against a relative path
    pub fn new(relative_path: impl Into<PathBuf>, error: MirrorCopyError) -> Self {
        Self {
            relative_path: relative_path.into(),
            error,
        }
    }
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl From<serde_json::Error> for MirrorCopyError {
    fn from(err: serde_json::Error) -> Self {
        MirrorCopyError::ConfigError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;

    /// Add path context, classifying the failure as a per-entry error
    fn for_entry(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MirrorCopyError::io(path, e))
    }

    fn for_entry(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MirrorCopyError::entry(path, e))
    }
}

/// Out of space, over quota, or read-only: nothing further can be written.
#[cfg(unix)]
fn is_volume_failure(err: &std::io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOSPC) | Some(libc::EDQUOT) | Some(libc::EROFS)
    )
}

#[cfg(not(unix))]
fn is_volume_failure(_err: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = MirrorCopyError::io("/test/path", io_err);
        assert_eq!(err.path(), Some(Path::new("/test/path")));
    }

    #[test]
    fn test_entry_classification() {
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let err = MirrorCopyError::entry("a.txt", denied);
        assert!(matches!(err, MirrorCopyError::PerEntryCopyFailure { .. }));
        assert_eq!(err.path(), Some(Path::new("a.txt")));
        assert!(!err.is_terminal());

        #[cfg(unix)]
        {
            let full = std::io::Error::from_raw_os_error(libc::ENOSPC);
            let err = MirrorCopyError::entry("b.bin", full);
            assert!(matches!(err, MirrorCopyError::CatastrophicIo { .. }));
            assert!(err.is_terminal());
        }
    }

    #[test]
    fn test_terminal_errors() {
        assert!(MirrorCopyError::EmptyInput.is_terminal());
        assert!(MirrorCopyError::DestinationExists(PathBuf::from("/x")).is_terminal());
        assert!(MirrorCopyError::invalid_source("/nope", "does not exist").is_terminal());

        let attr = MirrorCopyError::AttributeCopyFailed {
            path: PathBuf::from("f"),
            details: "owner".into(),
        };
        assert!(!attr.is_terminal());
        assert_eq!(attr.to_string(), "f: could not preserve owner");
    }
}
