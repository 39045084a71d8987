//! Mirror reconciliation
//!
//! After the copy pass the destination is cleaned of anything an exclusion
//! rule matches. Pruning destination entries that have no source
//! counterpart is only needed when mirroring into an existing destination.

use crate::error::{EntryError, IoResultExt, MirrorCopyError, Result};
use crate::fs::exclude::device_of;
use crate::fs::operations::remove_path;
use crate::fs::{ExclusionRules, PurgeReport};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Brings a destination tree in line with its source
pub struct Reconciler<'a> {
    rules: &'a ExclusionRules,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler applying `rules`
    pub fn new(rules: &'a ExclusionRules) -> Self {
        Self { rules }
    }

    /// Remove excluded entries that appeared in the destination
    pub fn cleanup(&self, destination: &Path) -> Result<PurgeReport> {
        let report = self.rules.purge(destination)?;
        if report.removed > 0 {
            info!(removed = report.removed, "removed excluded entries from destination");
        }
        Ok(report)
    }

    /// Delete every destination entry whose relative path does not exist in
    /// `source`, or that an exclusion rule matches.
    pub fn prune_extraneous(&self, source: &Path, destination: &Path) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        let root_device =
            device_of(&std::fs::symlink_metadata(destination).with_path(destination)?);

        let mut walker = WalkDir::new(destination)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(destination).to_path_buf();
                    let relative = path.strip_prefix(destination).unwrap_or(&path).to_path_buf();
                    report.errors.push(EntryError::new(
                        relative,
                        MirrorCopyError::entry(&path, std::io::Error::from(err)),
                    ));
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

            let relative = entry.path().strip_prefix(destination).unwrap_or(entry.path());
            let in_source = std::fs::symlink_metadata(source.join(relative)).is_ok();
            if in_source && !self.rules.is_excluded(relative) {
                continue;
            }

            if is_dir {
                walker.skip_current_dir();
            }
            match remove_path(entry.path()) {
                Ok(()) => {
                    debug!(path = %relative.display(), "pruned extraneous entry");
                    report.removed += 1;
                }
                Err(e) => report
                    .errors
                    .push(EntryError::new(relative, MirrorCopyError::entry(entry.path(), e))),
            }
        }

        Ok(report)
    }
}
