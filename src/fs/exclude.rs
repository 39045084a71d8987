//! Exclusion rules
//!
//! Reserved OS metadata files (`.DS_Store` by default) and user glob
//! patterns. The same rules are used to skip entries while scanning and to
//! purge a tree afterwards.

use crate::config::SyncConfig;
use crate::error::{EntryError, IoResultExt, MirrorCopyError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Predicate over relative paths
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    names: Vec<OsString>,
    patterns: GlobSet,
}

/// Outcome of purging excluded entries from a tree
#[derive(Debug, Default)]
pub struct PurgeReport {
    /// Entries removed (a removed directory counts once)
    pub removed: u64,
    /// Entries that could not be removed
    pub errors: Vec<EntryError>,
}

impl ExclusionRules {
    /// Build rules from exact file names and glob patterns
    pub fn new(names: &[String], patterns: &[String]) -> Result<Self> {
        Ok(Self {
            names: names.iter().map(OsString::from).collect(),
            patterns: Self::build_globset(patterns)?,
        })
    }

    /// Rules matching nothing
    pub fn none() -> Self {
        Self {
            names: Vec::new(),
            patterns: GlobSet::empty(),
        }
    }

    /// Rules described by a run configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(&config.excluded_names(), &config.exclude_patterns)
    }

    /// Build a GlobSet from patterns
    fn build_globset(patterns: &[String]) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                MirrorCopyError::config(format!("Invalid glob pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| MirrorCopyError::config(format!("Failed to build glob set: {}", e)))
    }

    /// True when no rule is configured
    pub fn is_empty(&self) -> bool {
        self.names.is_empty() && self.patterns.is_empty()
    }

    /// Check a path relative to the tree root
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if let Some(name) = relative.file_name() {
            if self.names.iter().any(|n| n == name) {
                return true;
            }
            if self.patterns.is_match(Path::new(name)) {
                return true;
            }
        }
        self.patterns.is_match(relative)
    }

    /// Remove every excluded entry under `root`.
    ///
    /// Mount points below `root` are not entered. Running a purge on an
    /// already purged tree removes nothing.
    pub fn purge(&self, root: &Path) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        if self.is_empty() {
            return Ok(report);
        }

        let root_device = device_of(&std::fs::symlink_metadata(root).with_path(root)?);
        let mut walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    let relative = err
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    let path = err.path().unwrap_or(root).to_path_buf();
                    let io_err = std::io::Error::from(err);
                    report
                        .errors
                        .push(EntryError::new(relative, MirrorCopyError::entry(path, io_err)));
                    continue;
                }
            };

            let is_dir = entry.file_type().is_dir();
            if let Ok(metadata) = entry.metadata() {
                if device_of(&metadata) != root_device {
                    if is_dir {
                        walker.skip_current_dir();
                    }
                    continue;
                }
            }

            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !self.is_excluded(relative) {
                continue;
            }

            let removed = if is_dir {
                walker.skip_current_dir();
                std::fs::remove_dir_all(entry.path())
            } else {
                std::fs::remove_file(entry.path())
            };

            match removed {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "removed excluded entry");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "could not remove excluded entry");
                    report.errors.push(EntryError::new(
                        relative,
                        MirrorCopyError::entry(entry.path(), e),
                    ));
                }
            }
        }

        Ok(report)
    }
}

#[cfg(unix)]
pub(crate) fn device_of(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.dev()
}

#[cfg(not(unix))]
pub(crate) fn device_of(_metadata: &std::fs::Metadata) -> u64 {
    0
}
