//! Source path resolution
//!
//! Turns the raw source argument into an immutable [`SyncRequest`].
//! Validation only: nothing is created or modified here.

use crate::config::DESTINATION_SUFFIX;
use crate::error::{MirrorCopyError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to copy and where; fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRequest {
    source: PathBuf,
    destination: PathBuf,
}

impl SyncRequest {
    /// Validate `raw_source` and derive the destination under `destination_root`
    pub fn resolve(raw_source: &str, destination_root: &Path) -> Result<Self> {
        let trimmed = strip_quotes(raw_source);
        if trimmed.is_empty() {
            return Err(MirrorCopyError::EmptyInput);
        }

        let given = PathBuf::from(trimmed);
        let metadata = std::fs::metadata(&given).map_err(|e| {
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                "does not exist".to_string()
            } else {
                e.to_string()
            };
            MirrorCopyError::invalid_source(&given, reason)
        })?;
        if !metadata.is_dir() {
            return Err(MirrorCopyError::invalid_source(&given, "not a directory"));
        }

        let source = given
            .canonicalize()
            .map_err(|e| MirrorCopyError::invalid_source(&given, e.to_string()))?;
        let mut folder = source
            .file_name()
            .ok_or_else(|| MirrorCopyError::invalid_source(&source, "has no folder name"))?
            .to_os_string();
        folder.push(DESTINATION_SUFFIX);

        let destination = destination_root.join(&folder);
        match std::fs::symlink_metadata(&destination) {
            Ok(_) => return Err(MirrorCopyError::DestinationExists(destination)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(MirrorCopyError::io(&destination, e)),
        }

        let effective_root = destination_root
            .canonicalize()
            .unwrap_or_else(|_| destination_root.to_path_buf());
        if effective_root.join(&folder).starts_with(&source) {
            return Err(MirrorCopyError::DestinationInsideSource {
                source_path: source,
                destination,
            });
        }

        debug!(source = %source.display(), destination = %destination.display(), "resolved request");
        Ok(Self {
            source,
            destination,
        })
    }

    /// Canonical source directory
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination directory to be created
    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Strip surrounding whitespace and matching quote pairs
pub fn strip_quotes(raw: &str) -> &str {
    let mut s = raw.trim();
    loop {
        let quoted = s.len() >= 2
            && ((s.starts_with('"') && s.ends_with('"'))
                || (s.starts_with('\'') && s.ends_with('\'')));
        if !quoted {
            return s;
        }
        s = s[1..s.len() - 1].trim();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("  '/a b/c'  "), "/a b/c");
        assert_eq!(strip_quotes("\"/x\""), "/x");
        assert_eq!(strip_quotes("\"'/x'\""), "/x");
        assert_eq!(strip_quotes("'unbalanced"), "'unbalanced");
        assert_eq!(strip_quotes("\"\""), "");
        assert_eq!(strip_quotes("'"), "'");
    }

    #[test]
    fn test_resolve_derives_destination() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let folder = src.path().join("Photos 2024");
        std::fs::create_dir(&folder).unwrap();

        let raw = format!("'{}/'", folder.display());
        let request = SyncRequest::resolve(&raw, root.path()).unwrap();

        assert_eq!(request.source(), folder.canonicalize().unwrap());
        assert_eq!(
            request.destination(),
            root.path().join("Photos 2024 rsync folder")
        );
    }

    #[test]
    fn test_empty_input() {
        let root = TempDir::new().unwrap();
        assert!(matches!(
            SyncRequest::resolve("  \"\" ", root.path()),
            Err(MirrorCopyError::EmptyInput)
        ));
    }

    #[test]
    fn test_invalid_sources() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let file = src.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();

        let missing = src.path().join("missing");
        assert!(matches!(
            SyncRequest::resolve(missing.to_str().unwrap(), root.path()),
            Err(MirrorCopyError::InvalidSource { .. })
        ));
        assert!(matches!(
            SyncRequest::resolve(file.to_str().unwrap(), root.path()),
            Err(MirrorCopyError::InvalidSource { .. })
        ));
    }

    #[test]
    fn test_destination_exists() {
        let src = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let folder = src.path().join("docs");
        std::fs::create_dir(&folder).unwrap();
        std::fs::create_dir(root.path().join("docs rsync folder")).unwrap();

        let err = SyncRequest::resolve(folder.to_str().unwrap(), root.path()).unwrap_err();
        assert!(matches!(err, MirrorCopyError::DestinationExists(_)));
    }

    #[test]
    fn test_destination_inside_source() {
        let src = TempDir::new().unwrap();
        let desktop = src.path().join("Desktop");
        std::fs::create_dir(&desktop).unwrap();

        let err = SyncRequest::resolve(src.path().to_str().unwrap(), &desktop).unwrap_err();
        assert!(matches!(err, MirrorCopyError::DestinationInsideSource { .. }));
    }
}
