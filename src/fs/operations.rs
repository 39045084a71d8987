//! File operations
//!
//! Content copy (zero-copy `copy_file_range` on Linux, buffered elsewhere or
//! as fallback) and creation of directories, symlinks and hard links at the
//! destination. Nothing here ever replaces an existing destination object.

use crate::config::MAX_BUFFER_SIZE;
use crate::error::{IoResultExt, MirrorCopyError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::trace;

/// Copy operation statistics
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    /// Bytes copied
    pub bytes_copied: u64,
    /// Duration of the copy
    pub duration: Duration,
    /// Method used for copy
    pub method: CopyMethod,
}

/// Copy method used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CopyMethod {
    /// Standard buffered I/O
    #[default]
    Buffered,
    /// In-kernel copy using copy_file_range
    ZeroCopy,
}

/// Options for file copy operations
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Buffer size for buffered operations
    pub buffer_size: usize,
    /// Use zero-copy if available
    pub use_zero_copy: bool,
    /// Sync to disk after copy
    pub sync: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            buffer_size: 1024 * 1024, // 1MB
            use_zero_copy: true,
            sync: false,
        }
    }
}

/// Content copier
pub struct FileCopier {
    options: CopyOptions,
}

impl FileCopier {
    /// Create a new file copier with the given options
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Copy the bytes of `source` into a new file at `dest`.
    ///
    /// `dest` must not exist. Read failures are attributed to `source`,
    /// write failures to `dest` (so a full volume is recognised as such).
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<CopyStats> {
        let start = Instant::now();

        let mut src_file = File::open(source).for_entry(source)?;
        let mut dst_file = create_new_file(dest).for_entry(dest)?;

        let (bytes_copied, method) =
            match self.transfer(&mut src_file, &mut dst_file, source, dest) {
                Ok(done) => done,
                Err(e) => {
                    // a half-written file must not look like a copy
                    drop(dst_file);
                    let _ = std::fs::remove_file(dest);
                    return Err(e);
                }
            };

        trace!(path = %dest.display(), bytes = bytes_copied, ?method, "copied content");

        Ok(CopyStats {
            bytes_copied,
            duration: start.elapsed(),
            method,
        })
    }

    fn transfer(
        &self,
        src_file: &mut File,
        dst_file: &mut File,
        source: &Path,
        dest: &Path,
    ) -> Result<(u64, CopyMethod)> {
        let mut result = None;

        if self.options.use_zero_copy {
            if let Some(bytes) = copy_zero_copy(src_file, dst_file, source, dest)? {
                result = Some((bytes, CopyMethod::ZeroCopy));
            }
        }

        let result = match result {
            Some(done) => done,
            None => (
                self.copy_buffered(src_file, dst_file, source, dest)?,
                CopyMethod::Buffered,
            ),
        };

        if self.options.sync {
            dst_file.sync_all().for_entry(dest)?;
        }

        Ok(result)
    }

    /// Buffered copy - reliable fallback
    fn copy_buffered(
        &self,
        src_file: &mut File,
        dst_file: &mut File,
        source: &Path,
        dest: &Path,
    ) -> Result<u64> {
        let mut buffer = vec![0u8; self.options.buffer_size.clamp(4096, MAX_BUFFER_SIZE)];
        let mut total = 0u64;

        loop {
            let read = match src_file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(MirrorCopyError::entry(source, e)),
            };
            dst_file.write_all(&buffer[..read]).for_entry(dest)?;
            total += read as u64;
        }

        dst_file.flush().for_entry(dest)?;
        Ok(total)
    }
}

#[cfg(unix)]
fn create_new_file(dest: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(dest)
}

#[cfg(not(unix))]
fn create_new_file(dest: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(dest)
}

/// Zero-copy using copy_file_range.
///
/// Returns `Ok(None)` when the kernel or filesystem cannot do it and nothing
/// was written yet, so the caller falls back to a buffered copy.
#[cfg(target_os = "linux")]
fn copy_zero_copy(src_file: &File, dst_file: &File, source: &Path, dest: &Path) -> Result<Option<u64>> {
    use std::os::unix::io::AsRawFd;

    let size = src_file.metadata().for_entry(source)?.len();
    if size == 0 {
        // procfs and friends report 0 for files that still have content
        return Ok(None);
    }

    let src_fd = src_file.as_raw_fd();
    let dst_fd = dst_file.as_raw_fd();

    let mut total_copied: u64 = 0;
    let mut offset_in: i64 = 0;
    let mut offset_out: i64 = 0;

    loop {
        let to_copy = (size.saturating_sub(total_copied)).max(64 * 1024).min(1 << 30) as usize;

        // SAFETY: both descriptors are open for the duration of the call and
        // the offsets point to live stack variables.
        let copied = unsafe {
            libc::copy_file_range(src_fd, &mut offset_in, dst_fd, &mut offset_out, to_copy, 0)
        };

        if copied < 0 {
            let err = std::io::Error::last_os_error();
            if total_copied == 0
                && matches!(
                    err.raw_os_error(),
                    Some(libc::ENOSYS)
                        | Some(libc::EXDEV)
                        | Some(libc::EINVAL)
                        | Some(libc::EOPNOTSUPP)
                        | Some(libc::EPERM)
                )
            {
                return Ok(None);
            }
            return Err(classify_range_error(err, source, dest));
        }

        if copied == 0 {
            break; // EOF
        }

        total_copied += copied as u64;
    }

    Ok(Some(total_copied))
}

#[cfg(target_os = "linux")]
fn classify_range_error(err: std::io::Error, source: &Path, dest: &Path) -> MirrorCopyError {
    match err.raw_os_error() {
        Some(libc::ENOSPC) | Some(libc::EDQUOT) | Some(libc::EFBIG) => {
            MirrorCopyError::entry(dest, err)
        }
        _ => MirrorCopyError::entry(source, err),
    }
}

#[cfg(not(target_os = "linux"))]
fn copy_zero_copy(_src: &File, _dst: &File, _source: &Path, _dest: &Path) -> Result<Option<u64>> {
    Ok(None)
}

/// Create a directory that its owner can always write into.
///
/// The real permission bits are applied once the directory's children exist.
#[cfg(unix)]
pub fn create_directory(dest: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new().mode(0o700).create(dest)
}

#[cfg(not(unix))]
pub fn create_directory(dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir(dest)
}

/// Recreate a symlink with the same, unresolved, target
#[cfg(unix)]
pub fn create_symlink(target: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
pub fn create_symlink(_target: &Path, _dest: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Link `dest` to an already copied object
pub fn create_hard_link(existing: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::hard_link(existing, dest)
}

/// Remove a file, symlink or directory tree
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let metadata = std::fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, size: usize) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        path
    }

    #[test]
    fn test_copy_small_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "test.txt", 1024);
        let dst = dst_dir.path().join("test.txt");

        let copier = FileCopier::new(CopyOptions::default());
        let stats = copier.copy(&src, &dst).unwrap();

        assert_eq!(stats.bytes_copied, 1024);
        assert_eq!(std::fs::metadata(&dst).unwrap().len(), 1024);
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dst).unwrap());
    }

    #[test]
    fn test_buffered_copy_matches() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "big.bin", 3 * 1024 * 1024 + 17);
        let dst = dst_dir.path().join("big.bin");

        let copier = FileCopier::new(CopyOptions {
            buffer_size: 64 * 1024,
            use_zero_copy: false,
            sync: true,
        });
        let stats = copier.copy(&src, &dst).unwrap();

        assert_eq!(stats.method, CopyMethod::Buffered);
        assert_eq!(stats.bytes_copied, 3 * 1024 * 1024 + 17);
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dst).unwrap());
    }

    #[test]
    fn test_copy_empty_file() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = src_dir.path().join("empty.txt");
        File::create(&src).unwrap();
        let dst = dst_dir.path().join("empty.txt");

        let stats = FileCopier::new(CopyOptions::default()).copy(&src, &dst).unwrap();

        assert_eq!(stats.bytes_copied, 0);
        assert!(dst.exists());
    }

    #[test]
    fn test_copy_never_overwrites() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();

        let src = create_test_file(src_dir.path(), "a", 10);
        let dst = dst_dir.path().join("a");
        std::fs::write(&dst, b"original").unwrap();

        let err = FileCopier::new(CopyOptions::default()).copy(&src, &dst).unwrap_err();
        assert!(matches!(err, MirrorCopyError::PerEntryCopyFailure { .. }));
        assert_eq!(std::fs::read(&dst).unwrap(), b"original");
    }

    #[test]
    fn test_missing_source_is_entry_failure() {
        let dir = TempDir::new().unwrap();
        let err = FileCopier::new(CopyOptions::default())
            .copy(&dir.path().join("nope"), &dir.path().join("out"))
            .unwrap_err();
        assert_eq!(err.path(), Some(dir.path().join("nope").as_path()));
        assert!(!dir.path().join("out").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_links_and_removal() {
        let dir = TempDir::new().unwrap();
        let file = create_test_file(dir.path(), "f", 8);

        create_symlink(Path::new("f"), &dir.path().join("l")).unwrap();
        assert_eq!(std::fs::read_link(dir.path().join("l")).unwrap(), PathBuf::from("f"));

        create_hard_link(&file, &dir.path().join("h")).unwrap();
        create_directory(&dir.path().join("d")).unwrap();
        assert!(create_directory(&dir.path().join("d")).is_err());

        remove_path(&dir.path().join("l")).unwrap();
        remove_path(&dir.path().join("d")).unwrap();
        assert!(file.exists());
        assert!(!dir.path().join("d").exists());
    }
}
