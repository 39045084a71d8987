//! # MirrorCopy - metadata-preserving folder mirroring
//!
//! MirrorCopy copies a source folder into a fresh `"<name> rsync folder"`
//! directory on the desktop (or any destination root), keeping permission
//! bits, ownership, timestamps, extended attributes, file flags, symlinks
//! and hard-link identity.
//!
//! ## Features
//!
//! - **Never overwrites**: an existing destination stops the run untouched
//! - **Hard links**: linked files are copied once and re-linked
//! - **One filesystem**: mount points inside the source are not crossed
//! - **Exclusions**: `.DS_Store` and user globs are skipped and purged
//! - **Partial failure**: one unreadable file does not stop the pass
//!
//! ## Quick Start
//!
//! ```no_run
//! use mirrorcopy::config::SyncConfig;
//! use mirrorcopy::core::{SyncEngine, SyncRequest};
//! use std::path::Path;
//!
//! let request = SyncRequest::resolve("/data/photos", Path::new("/backup")).unwrap();
//! let engine = SyncEngine::new(request, SyncConfig::default()).unwrap();
//! let result = engine.execute().unwrap();
//!
//! println!("Copied {} files ({} bytes)", result.files_copied, result.bytes_copied);
//! ```
//!
//! ## Full run with a report
//!
//! ```no_run
//! use mirrorcopy::config::{OutputFormat, SyncConfig};
//! use mirrorcopy::core::run;
//! use mirrorcopy::progress::ConsoleReport;
//!
//! let mut report = ConsoleReport::stdio(OutputFormat::Text, false);
//! let status = run(Some("'/data/photos'"), &SyncConfig::default(), &mut report, None);
//! std::process::exit(status.exit_code());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod progress;

// Re-export commonly used types
pub use config::{SyncConfig, PreserveOptions};
pub use core::{run, CopyResult, RunStatus, SyncEngine, SyncRequest};
pub use error::{MirrorCopyError, Result};
pub use progress::{Outcome, ProgressReporter, Report};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use mirrorcopy::prelude::*;
    //! ```

    pub use crate::config::{OutputFormat, PreserveOptions, SyncConfig};
    pub use crate::core::{run, CopyResult, RunStatus, SyncEngine, SyncRequest};
    pub use crate::error::{MirrorCopyError, Result};
    pub use crate::fs::{Entry, EntryKind, ExclusionRules, ScanConfig, Scanner};
    pub use crate::progress::{format_size, ConsoleReport, Outcome, ProgressReporter, Report};
}
