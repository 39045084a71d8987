//! Configuration settings for MirrorCopy
//!
//! Defines the CLI arguments, the JSON config file layout, and the runtime
//! settings passed explicitly through every component of a run.

use crate::error::{IoResultExt, MirrorCopyError, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name appended to the source folder's basename to form the destination
pub const DESTINATION_SUFFIX: &str = " rsync folder";

/// Reserved OS metadata file names excluded unless disabled
pub const DEFAULT_EXCLUDED_NAMES: &[&str] = &[".DS_Store"];

/// Largest copy buffer accepted from the command line or a config file
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024 * 1024;

/// MirrorCopy - mirror a folder to the desktop, metadata included
#[derive(Parser, Debug, Clone)]
#[command(name = "mirrorcopy")]
#[command(author = "MirrorCopy Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mirror a folder to the desktop, preserving metadata and hard links")]
#[command(long_about = r#"
MirrorCopy copies a folder into a new "<name> rsync folder" directory on
your desktop (or another destination root), preserving:
  - permission bits, owner and group
  - modification, access and (on macOS) creation times
  - extended attributes and file flags
  - hard links and symbolic links

Mount points inside the source are not crossed and .DS_Store files are
left behind. An existing destination is never overwritten.

Examples:
  mirrorcopy ~/Projects/site                  # -> ~/Desktop/site rsync folder
  mirrorcopy --source "/Volumes/Card/DCIM"    # same, as a flag
  mirrorcopy ~/photos --dest-root /backup     # custom destination root
  mirrorcopy ~/photos --clean-source          # delete .DS_Store in source first
"#)]
pub struct CliArgs {
    /// Source folder to mirror (surrounding quotes are stripped)
    #[arg(value_name = "SOURCE", conflicts_with = "source_flag")]
    pub source: Option<String>,

    /// Source folder, as a flag instead of a positional argument
    #[arg(long = "source", value_name = "PATH")]
    pub source_flag: Option<String>,

    /// Directory the "<name> rsync folder" is created in (default: ~/Desktop)
    #[arg(long, env = "MIRRORCOPY_DEST_ROOT", value_name = "DIR")]
    pub dest_root: Option<PathBuf>,

    /// Delete excluded files (e.g. .DS_Store) from the source before copying
    #[arg(long)]
    pub clean_source: bool,

    /// Additional pattern to exclude (glob, repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Do not exclude the reserved OS metadata files
    #[arg(long)]
    pub no_default_excludes: bool,

    /// Buffer size for file copies (e.g., 1M, 64K)
    #[arg(short = 'b', long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// JSON configuration file
    #[arg(long, env = "MIRRORCOPY_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output format for the final report
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Show live progress
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress the success report)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl CliArgs {
    /// The source argument, from either the positional or `--source`
    pub fn source_arg(&self) -> Option<&str> {
        self.source.as_deref().or(self.source_flag.as_deref())
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Which attributes are carried over to the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreserveOptions {
    /// Permission bits
    pub permissions: bool,
    /// Owning user
    pub owner: bool,
    /// Owning group
    pub group: bool,
    /// Access, modification and creation times
    pub times: bool,
    /// Extended attributes
    pub xattrs: bool,
    /// Filesystem flags (macOS/BSD)
    pub flags: bool,
    /// Re-link hard-link groups instead of duplicating content
    pub hard_links: bool,
}

impl Default for PreserveOptions {
    fn default() -> Self {
        Self {
            permissions: true,
            owner: true,
            group: true,
            times: true,
            xattrs: true,
            flags: true,
            hard_links: true,
        }
    }
}

/// Runtime configuration of a mirror run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Where the destination folder is created (None = ~/Desktop)
    pub destination_root: Option<PathBuf>,
    /// Purge excluded files from the source before copying
    pub clean_source: bool,
    /// Exclude the reserved OS metadata file names
    pub default_excludes: bool,
    /// Extra glob patterns to exclude
    pub exclude_patterns: Vec<String>,
    /// Attribute preservation switches
    pub preserve: PreserveOptions,
    /// Buffer size in bytes for buffered copies
    pub buffer_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            destination_root: None,
            clean_source: false,
            default_excludes: true,
            exclude_patterns: Vec::new(),
            preserve: PreserveOptions::default(),
            buffer_size: 1024 * 1024, // 1MB
        }
    }
}

impl SyncConfig {
    /// Load a JSON config file; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let config: SyncConfig = serde_json::from_str(&text)
            .map_err(|e| MirrorCopyError::config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Create config from CLI arguments, layered over the config file if any
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(root) = &args.dest_root {
            config.destination_root = Some(root.clone());
        }
        config.clean_source |= args.clean_source;
        if args.no_default_excludes {
            config.default_excludes = false;
        }
        config.exclude_patterns.extend(args.exclude.iter().cloned());

        if let Some(size) = &args.buffer_size {
            let bytes = parse_size(size)
                .map_err(|e| MirrorCopyError::config(format!("Invalid buffer size: {}", e)))?;
            config.buffer_size = usize::try_from(bytes).unwrap_or(usize::MAX);
        }

        // applies to the config file value too
        if config.buffer_size == 0 {
            return Err(MirrorCopyError::config("Buffer size must be greater than zero"));
        }
        if config.buffer_size > MAX_BUFFER_SIZE {
            return Err(MirrorCopyError::config(format!(
                "Buffer size {} exceeds the maximum of {} bytes",
                config.buffer_size, MAX_BUFFER_SIZE
            )));
        }

        Ok(config)
    }

    /// Resolve the destination root, defaulting to `<home>/Desktop`
    pub fn destination_root(&self) -> Result<PathBuf> {
        match &self.destination_root {
            Some(root) => Ok(root.clone()),
            None => dirs::home_dir()
                .map(|home| home.join("Desktop"))
                .ok_or_else(|| MirrorCopyError::config("Cannot determine the home directory")),
        }
    }

    /// Reserved names excluded from the copy
    pub fn excluded_names(&self) -> Vec<String> {
        if self.default_excludes {
            DEFAULT_EXCLUDED_NAMES.iter().map(|s| s.to_string()).collect()
        } else {
            Vec::new()
        }
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if !num.is_finite() {
        return Err(format!("Invalid number: {}", num_str));
    }
    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
