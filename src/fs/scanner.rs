//! Lazy source tree scanner
//!
//! Walks a tree in name order (parents before children) and yields one
//! [`Entry`] per object with a full metadata snapshot. Excluded entries,
//! special files and anything on another filesystem are skipped without
//! being yielded.

use crate::error::{EntryError, IoResultExt, MirrorCopyError, Result};
use crate::fs::exclude::device_of;
use crate::fs::hardlinks::{HardlinkGroupId, HardlinkIndex};
use crate::fs::metadata::{file_flags, read_xattrs, Xattr};
use crate::fs::ExclusionRules;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Kind of filesystem object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file with a single link
    File,
    /// Directory
    Directory,
    /// Symbolic link and its unresolved target
    Symlink {
        /// Link target as stored in the link
        target: PathBuf,
    },
    /// Regular file sharing its inode with other entries
    HardlinkMember,
}

/// Metadata snapshot for a single source object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Absolute path in the source tree
    pub path: PathBuf,
    /// Path relative to the source root (empty for the root itself)
    pub relative_path: PathBuf,
    /// Kind of object
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Mode bits (permission bits in the low 12 bits)
    pub permissions: u32,
    /// Owning user id
    pub uid: u32,
    /// Owning group id
    pub gid: u32,
    /// Creation time (if available)
    pub created: Option<SystemTime>,
    /// Modification time
    pub modified: SystemTime,
    /// Access time
    pub accessed: SystemTime,
    /// Extended attributes
    pub xattrs: Vec<Xattr>,
    /// Why the extended attributes could not be read, if they could not
    pub xattr_error: Option<String>,
    /// Filesystem flags (macOS/BSD only)
    pub flags: Option<u32>,
    /// Device id
    pub device: u64,
    /// Inode number
    pub inode: u64,
    /// Hard-link group (set only for `HardlinkMember`)
    pub hardlink_group: Option<HardlinkGroupId>,
}

impl Entry {
    /// Build an entry from already-fetched `lstat` metadata
    fn from_metadata(
        path: &Path,
        relative_path: PathBuf,
        metadata: &Metadata,
        kind: EntryKind,
        hardlink_group: Option<HardlinkGroupId>,
        capture_xattrs: bool,
    ) -> Self {
        let (permissions, uid, gid, inode) = ownership_of(metadata);

        let wants_xattrs = capture_xattrs && !matches!(kind, EntryKind::Symlink { .. });
        let (xattrs, xattr_error) = if wants_xattrs {
            match read_xattrs(path) {
                Ok(xattrs) => (xattrs, None),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "cannot read extended attributes");
                    (Vec::new(), Some(e.to_string()))
                }
            }
        } else {
            (Vec::new(), None)
        };

        Entry {
            path: path.to_path_buf(),
            relative_path,
            kind,
            size: metadata.len(),
            permissions,
            uid,
            gid,
            created: metadata.created().ok(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            accessed: metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            xattrs,
            xattr_error,
            flags: file_flags(metadata),
            device: device_of(metadata),
            inode,
            hardlink_group,
        }
    }

    /// Is this a directory?
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Is this the source root itself?
    pub fn is_root(&self) -> bool {
        self.relative_path.as_os_str().is_empty()
    }

    /// Does this entry carry byte content (regular file or link member)?
    pub fn has_content(&self) -> bool {
        matches!(self.kind, EntryKind::File | EntryKind::HardlinkMember)
    }
}

#[cfg(unix)]
fn ownership_of(metadata: &Metadata) -> (u32, u32, u32, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.mode(), metadata.uid(), metadata.gid(), metadata.ino())
}

#[cfg(not(unix))]
fn ownership_of(metadata: &Metadata) -> (u32, u32, u32, u64) {
    let mode = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    (mode, 0, 0, 0)
}

/// Configuration for directory scanning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Entries never yielded (and never descended into)
    pub exclusions: ExclusionRules,
    /// Skip everything on a different device than the root
    pub one_file_system: bool,
    /// Snapshot extended attributes
    pub capture_xattrs: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclusions: ExclusionRules::none(),
            one_file_system: true,
            capture_xattrs: true,
        }
    }
}

/// Entries left out of a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    /// On another filesystem than the root
    pub other_device: u64,
    /// Matched an exclusion rule
    pub excluded: u64,
    /// FIFOs, sockets and device nodes
    pub special: u64,
}

impl SkipCounts {
    /// Total skipped entries
    pub fn total(&self) -> u64 {
        self.other_device + self.excluded + self.special
    }
}

/// Directory scanner; every call to [`Scanner::scan`] starts a fresh walk
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    /// Create a new scanner with the given configuration
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Start a lazy walk of `root`
    pub fn scan(&self, root: &Path) -> Result<ScanIter<'_>> {
        let root_meta = std::fs::metadata(root).with_path(root)?;
        if !root_meta.is_dir() {
            return Err(MirrorCopyError::invalid_source(root, "not a directory"));
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(ScanIter {
            config: &self.config,
            root: root.to_path_buf(),
            root_device: device_of(&root_meta),
            inner: walker,
            hardlinks: HardlinkIndex::new(),
            skipped: SkipCounts::default(),
        })
    }
}

/// Item yielded by a scan
pub type ScanItem = std::result::Result<Entry, EntryError>;

/// Lazy iterator over a source tree
pub struct ScanIter<'a> {
    config: &'a ScanConfig,
    root: PathBuf,
    root_device: u64,
    inner: walkdir::IntoIter,
    hardlinks: HardlinkIndex,
    skipped: SkipCounts,
}

impl ScanIter<'_> {
    /// Do not descend into the directory yielded last
    pub fn skip_current_dir(&mut self) {
        self.inner.skip_current_dir();
    }

    /// Entries skipped so far
    pub fn skipped(&self) -> SkipCounts {
        self.skipped
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    fn walk_error(&self, err: walkdir::Error) -> EntryError {
        let path = err.path().unwrap_or(&self.root).to_path_buf();
        let relative = self.relative(&path);
        EntryError::new(relative, MirrorCopyError::entry(path, std::io::Error::from(err)))
    }
}

impl Iterator for ScanIter<'_> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir_entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(self.walk_error(err))),
            };

            let path = dir_entry.path();
            let relative = self.relative(path);
            let is_dir = dir_entry.file_type().is_dir();

            if dir_entry.depth() > 0 && self.config.exclusions.is_excluded(&relative) {
                trace!(path = %relative.display(), "excluded");
                if is_dir {
                    self.inner.skip_current_dir();
                }
                self.skipped.excluded += 1;
                continue;
            }

            let metadata = match dir_entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    // its children cannot be recreated without it
                    if is_dir {
                        self.inner.skip_current_dir();
                    }
                    return Some(Err(self.walk_error(err)));
                }
            };

            if self.config.one_file_system && device_of(&metadata) != self.root_device {
                debug!(path = %relative.display(), "not crossing filesystem boundary");
                if is_dir {
                    self.inner.skip_current_dir();
                }
                self.skipped.other_device += 1;
                continue;
            }

            let file_type = metadata.file_type();
            let mut group = None;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else if file_type.is_symlink() {
                match std::fs::read_link(path) {
                    Ok(target) => EntryKind::Symlink { target },
                    Err(e) => {
                        return Some(Err(EntryError::new(
                            relative,
                            MirrorCopyError::entry(path, e),
                        )))
                    }
                }
            } else if file_type.is_file() {
                group = self.hardlinks.group_for(&metadata);
                if group.is_some() {
                    EntryKind::HardlinkMember
                } else {
                    EntryKind::File
                }
            } else {
                debug!(path = %relative.display(), "skipping special file");
                self.skipped.special += 1;
                continue;
            };

            return Some(Ok(Entry::from_metadata(
                path,
                relative,
                &metadata,
                kind,
                group,
                self.config.capture_xattrs,
            )));
        }
    }
}

/// Quick count of the regular files and bytes a scan would yield
pub fn estimate_tree_size(root: &Path, config: &ScanConfig) -> (u64, u64) {
    let quick = ScanConfig {
        capture_xattrs: false,
        ..config.clone()
    };
    let scanner = Scanner::new(quick);
    let Ok(entries) = scanner.scan(root) else {
        return (0, 0);
    };

    entries
        .filter_map(|e| e.ok())
        .filter(Entry::has_content)
        .fold((0, 0), |(bytes, files), e| (bytes + e.size, files + 1))
}
