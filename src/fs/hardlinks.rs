//! Hard link grouping and tracking.
//!
//! The scanner assigns every distinct `(device, inode)` pair with more than
//! one link a [`HardlinkGroupId`]. The copier then remembers where the first
//! member of each group landed so later members become links to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifies a set of entries sharing the same underlying storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardlinkGroupId(pub u64);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct InodeKey {
    device: u64,
    inode: u64,
}

/// Assigns group ids while scanning
#[derive(Debug, Default)]
pub struct HardlinkIndex {
    groups: HashMap<InodeKey, HardlinkGroupId>,
}

impl HardlinkIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Group id for a regular file, or `None` if it has a single link
    #[cfg(unix)]
    pub fn group_for(&mut self, metadata: &fs::Metadata) -> Option<HardlinkGroupId> {
        use std::os::unix::fs::MetadataExt;

        if !metadata.is_file() || metadata.nlink() <= 1 {
            return None;
        }
        let key = InodeKey {
            device: metadata.dev(),
            inode: metadata.ino(),
        };
        let next = HardlinkGroupId(self.groups.len() as u64);
        Some(*self.groups.entry(key).or_insert(next))
    }

    #[cfg(not(unix))]
    pub fn group_for(&mut self, _metadata: &fs::Metadata) -> Option<HardlinkGroupId> {
        None
    }
}

/// Remembers the destination of the first copied member of each group
#[derive(Debug, Default)]
pub struct HardLinkTracker {
    leaders: HashMap<HardlinkGroupId, PathBuf>,
}

impl HardLinkTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Destination already holding this group's content
    pub fn existing_target(&self, group: HardlinkGroupId) -> Option<&Path> {
        self.leaders.get(&group).map(PathBuf::as_path)
    }

    /// Record a successfully copied member; the first one recorded wins
    pub fn record(&mut self, group: HardlinkGroupId, destination: &Path) {
        self.leaders
            .entry(group)
            .or_insert_with(|| destination.to_path_buf());
    }
}
