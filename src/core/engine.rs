//! Mirror engine
//!
//! Drives one sequential pass: optional source clean-up, destination root
//! creation, scan-and-copy, destination purge and the directory attribute
//! fix-up. [`run`] wraps the whole thing and hands exactly one
//! [`Outcome`] to a [`Report`].

use crate::config::SyncConfig;
use crate::core::{strip_quotes, SyncRequest};
use crate::error::{EntryError, IoResultExt, MirrorCopyError, Result};
use crate::fs::{
    apply_metadata, create_directory, create_hard_link, create_symlink, estimate_tree_size,
    CopyOptions, Entry, EntryKind, ExclusionRules, FileCopier, HardLinkTracker, Reconciler,
    ScanConfig, Scanner, SkipCounts,
};
use crate::progress::{Outcome, ProgressReporter, Report};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Copy operation result
#[derive(Debug, Default)]
pub struct CopyResult {
    /// Regular files copied, hard links included
    pub files_copied: u64,
    /// Content bytes written
    pub bytes_copied: u64,
    /// Directories created, the destination root included
    pub dirs_created: u64,
    /// Symlinks recreated
    pub symlinks_created: u64,
    /// Files recreated as hard links to an earlier copy
    pub hardlinks_created: u64,
    /// Entries left out by the scanner
    pub skipped: SkipCounts,
    /// Per-entry failures, in the order they happened
    pub errors: Vec<EntryError>,
    /// The pass stopped early on a destination volume failure
    pub aborted: bool,
    /// Total duration
    pub duration: Duration,
}

impl CopyResult {
    /// Check if the copy was completely successful
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.aborted
    }

    /// Average throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        }
    }

    fn file_copied(&mut self, bytes: u64) {
        self.files_copied += 1;
        self.bytes_copied += bytes;
    }
}

/// Main mirror engine
pub struct SyncEngine {
    /// What to copy and where
    request: SyncRequest,
    /// Configuration
    config: SyncConfig,
    /// Exclusion rules shared by scan and purge
    rules: ExclusionRules,
    /// Content copier
    copier: FileCopier,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl SyncEngine {
    /// Create a new engine for a resolved request
    pub fn new(request: SyncRequest, config: SyncConfig) -> Result<Self> {
        let rules = ExclusionRules::from_config(&config)?;
        let copier = FileCopier::new(CopyOptions {
            buffer_size: config.buffer_size,
            ..Default::default()
        });

        Ok(Self {
            request,
            config,
            rules,
            copier,
            progress: None,
        })
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The request being carried out
    pub fn request(&self) -> &SyncRequest {
        &self.request
    }

    /// Execute the mirror.
    ///
    /// `Err` means nothing was copied (the destination root could not be
    /// made, or the source vanished). Everything that goes wrong after
    /// that is recorded in [`CopyResult::errors`].
    pub fn execute(&self) -> Result<CopyResult> {
        let start_time = Instant::now();
        let mut result = CopyResult::default();
        let source = self.request.source();
        let destination = self.request.destination();

        if self.config.clean_source {
            self.set_status("Cleaning source...");
            let report = self.rules.purge(source)?;
            info!(removed = report.removed, "removed excluded entries from source");
            result.errors.extend(report.errors);
        }

        self.create_root()?;
        result.dirs_created += 1;

        let scan_config = ScanConfig {
            exclusions: self.rules.clone(),
            one_file_system: true,
            capture_xattrs: self.config.preserve.xattrs,
        };

        if let Some(progress) = self.progress.as_ref().filter(|p| p.is_enabled()) {
            progress.set_status("Scanning source directory...");
            let (bytes, files) = estimate_tree_size(source, &scan_config);
            progress.set_totals(bytes, files);
        }

        let scanner = Scanner::new(scan_config);
        let mut entries = scanner.scan(source)?;
        let mut links = HardLinkTracker::new();
        let mut pending_dirs: Vec<Entry> = Vec::new();

        while let Some(item) = entries.next() {
            let entry = match item {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(path = %err.relative_path.display(), error = %err.error, "cannot read source entry");
                    result.errors.push(err);
                    continue;
                }
            };

            if let Some(progress) = &self.progress {
                progress.set_current_file(&entry.relative_path.to_string_lossy());
            }

            let target = self.destination_for(&entry);
            match self.copy_entry(&entry, &target, &mut links, &mut result) {
                Ok(()) => {
                    if entry.is_dir() {
                        pending_dirs.push(entry);
                    }
                }
                Err(error) => {
                    if entry.is_dir() {
                        entries.skip_current_dir();
                    }
                    let fatal = matches!(error, MirrorCopyError::CatastrophicIo { .. });
                    warn!(path = %entry.relative_path.display(), error = %error, "copy failed");
                    result.errors.push(EntryError::new(entry.relative_path, error));
                    if fatal {
                        warn!("destination can no longer be written, stopping");
                        result.aborted = true;
                        break;
                    }
                }
            }
        }
        result.skipped = entries.skipped();
        drop(entries);

        // purge before the fix-up: read-only directories and restored mtimes
        // must not be disturbed by deletions
        match Reconciler::new(&self.rules).cleanup(destination) {
            Ok(report) => result.errors.extend(report.errors),
            Err(e) => result.errors.push(EntryError::new(PathBuf::new(), e)),
        }

        self.finish_directories(&pending_dirs, &mut result);

        result.duration = start_time.elapsed();
        self.log_summary(&result);

        if let Some(progress) = &self.progress {
            if result.is_success() {
                progress.finish_success(&format!("Copied {} files", result.files_copied));
            } else {
                progress.finish_error(&format!("{} errors", result.errors.len()));
            }
        }

        Ok(result)
    }

    /// Create the (empty) destination root and its parents
    fn create_root(&self) -> Result<()> {
        let destination = self.request.destination();
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|source| MirrorCopyError::CatastrophicIo {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match create_directory(destination) {
            Ok(()) => {
                debug!(path = %destination.display(), "created destination root");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(MirrorCopyError::DestinationExists(destination.to_path_buf()))
            }
            Err(source) => Err(MirrorCopyError::CatastrophicIo {
                path: destination.to_path_buf(),
                source,
            }),
        }
    }

    fn destination_for(&self, entry: &Entry) -> PathBuf {
        if entry.is_root() {
            self.request.destination().to_path_buf()
        } else {
            self.request.destination().join(&entry.relative_path)
        }
    }

    /// Recreate one entry. Attribute problems are recorded directly and do
    /// not fail the entry; `Err` means the object itself was not created.
    fn copy_entry(
        &self,
        entry: &Entry,
        target: &Path,
        links: &mut HardLinkTracker,
        result: &mut CopyResult,
    ) -> Result<()> {
        match &entry.kind {
            EntryKind::Directory => {
                if !entry.is_root() {
                    create_directory(target).for_entry(target)?;
                    result.dirs_created += 1;
                }
                // attributes once the children exist
                return Ok(());
            }
            EntryKind::Symlink { target: link } => {
                create_symlink(link, target).for_entry(target)?;
                result.symlinks_created += 1;
            }
            EntryKind::HardlinkMember if self.config.preserve.hard_links => {
                let group = entry.hardlink_group;
                if let Some(leader) = group.and_then(|g| links.existing_target(g)) {
                    create_hard_link(leader, target).for_entry(target)?;
                    debug!(path = %entry.relative_path.display(), leader = %leader.display(), "linked");
                    result.file_copied(0);
                    result.hardlinks_created += 1;
                    self.file_done(0);
                    // same inode as the leader, attributes already applied
                    return Ok(());
                }

                let stats = self.copier.copy(&entry.path, target)?;
                if let Some(group) = group {
                    links.record(group, target);
                }
                result.file_copied(stats.bytes_copied);
                self.file_done(stats.bytes_copied);
            }
            EntryKind::File | EntryKind::HardlinkMember => {
                let stats = self.copier.copy(&entry.path, target)?;
                result.file_copied(stats.bytes_copied);
                self.file_done(stats.bytes_copied);
            }
        }

        if let Err(error) = apply_metadata(entry, target, &self.config.preserve) {
            warn!(path = %entry.relative_path.display(), error = %error, "attributes not fully preserved");
            result
                .errors
                .push(EntryError::new(entry.relative_path.clone(), error));
        }
        Ok(())
    }

    /// Apply directory attributes, children before parents
    fn finish_directories(&self, pending: &[Entry], result: &mut CopyResult) {
        for entry in pending.iter().rev() {
            let target = self.destination_for(entry);
            if let Err(error) = apply_metadata(entry, &target, &self.config.preserve) {
                warn!(path = %entry.relative_path.display(), error = %error, "directory attributes not fully preserved");
                result
                    .errors
                    .push(EntryError::new(entry.relative_path.clone(), error));
            }
        }
    }

    fn file_done(&self, bytes: u64) {
        if let Some(progress) = &self.progress {
            progress.file_done(bytes);
        }
    }

    fn set_status(&self, msg: &str) {
        if let Some(progress) = &self.progress {
            progress.set_status(msg);
        }
    }

    fn log_summary(&self, result: &CopyResult) {
        info!(
            files = result.files_copied,
            bytes = %humansize::format_size(result.bytes_copied, humansize::DECIMAL),
            dirs = result.dirs_created,
            symlinks = result.symlinks_created,
            hardlinks = result.hardlinks_created,
            skipped = result.skipped.total(),
            errors = result.errors.len(),
            duration = ?result.duration,
            throughput = %format!("{}/s", humansize::format_size(result.throughput() as u64, humansize::DECIMAL)),
            "mirror finished"
        );
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Nothing to do (no source given)
    NoOp,
    /// Everything copied
    Success,
    /// Terminal error or at least one per-entry error
    Failure,
}

impl RunStatus {
    /// Process exit code for this status
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::NoOp | RunStatus::Success => 0,
            RunStatus::Failure => 1,
        }
    }
}

/// Resolve, mirror and report.
///
/// `reporter` is called exactly once, except for an empty source where the
/// run is a silent no-op.
pub fn run(
    raw_source: Option<&str>,
    config: &SyncConfig,
    reporter: &mut dyn Report,
    progress: Option<ProgressReporter>,
) -> RunStatus {
    let raw = match raw_source {
        Some(raw) if !strip_quotes(raw).is_empty() => raw,
        _ => {
            debug!("no source given, nothing to do");
            return RunStatus::NoOp;
        }
    };

    let outcome = match mirror(raw, config, progress) {
        Ok(result) => Outcome::from_result(&result),
        Err(MirrorCopyError::EmptyInput) => return RunStatus::NoOp,
        Err(e) => {
            warn!(error = %e, "mirror failed");
            Outcome::from_error(&e)
        }
    };

    reporter.report(&outcome);
    if outcome.is_success() {
        RunStatus::Success
    } else {
        RunStatus::Failure
    }
}

fn mirror(
    raw_source: &str,
    config: &SyncConfig,
    progress: Option<ProgressReporter>,
) -> Result<CopyResult> {
    let root = config.destination_root()?;
    let request = SyncRequest::resolve(raw_source, &root)?;
    info!(
        source = %request.source().display(),
        destination = %request.destination().display(),
        "mirroring"
    );

    let mut engine = SyncEngine::new(request, config.clone())?;
    if let Some(progress) = progress {
        engine = engine.with_progress(progress);
    }
    engine.execute()
}
