//! File system operations module
//!
//! Provides tree scanning, exclusion rules, content copy, attribute
//! preservation, hard link tracking and destination reconciliation.

mod exclude;
pub mod hardlinks;
pub mod metadata;
mod operations;
mod reconcile;
mod scanner;

pub use exclude::{ExclusionRules, PurgeReport};
pub use hardlinks::{HardLinkTracker, HardlinkGroupId, HardlinkIndex};
pub use metadata::{apply_metadata, Xattr};
pub use operations::*;
pub use reconcile::Reconciler;
pub use scanner::*;
