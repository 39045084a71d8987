//! Attribute capture and preservation
//!
//! Reads extended attributes and file flags while scanning, and applies the
//! full attribute set (xattrs, ownership, permission bits, timestamps, flags)
//! to a destination object. Attribute failures never undo a content copy:
//! they are folded into one [`MirrorCopyError::AttributeCopyFailed`].

use crate::config::PreserveOptions;
use crate::error::{MirrorCopyError, Result};
use crate::fs::{Entry, EntryKind};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use tracing::{debug, trace};

/// One named extended attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Xattr {
    /// Attribute name, including its namespace prefix
    pub name: OsString,
    /// Raw attribute value
    pub value: Vec<u8>,
}

/// Read the extended attributes of `path` without following symlinks.
///
/// Filesystems without xattr support yield an empty list.
#[cfg(unix)]
pub fn read_xattrs(path: &Path) -> std::io::Result<Vec<Xattr>> {
    if !xattr::SUPPORTED_PLATFORM {
        return Ok(Vec::new());
    }

    let names = match xattr::list(path) {
        Ok(names) => names,
        Err(e) if is_unsupported(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut attrs = Vec::new();
    for name in names {
        if !xattr_copyable(&name) {
            trace!(path = %path.display(), name = ?name, "skipping xattr namespace");
            continue;
        }
        if let Some(value) = xattr::get(path, &name)? {
            attrs.push(Xattr { name, value });
        }
    }
    Ok(attrs)
}

#[cfg(not(unix))]
pub fn read_xattrs(_path: &Path) -> std::io::Result<Vec<Xattr>> {
    Ok(Vec::new())
}

/// Unprivileged Linux processes may only write the `user.` namespace.
#[cfg(target_os = "linux")]
fn xattr_copyable(name: &std::ffi::OsStr) -> bool {
    use std::os::unix::ffi::OsStrExt;
    nix::unistd::geteuid().is_root() || name.as_bytes().starts_with(b"user.")
}

#[cfg(all(unix, not(target_os = "linux")))]
fn xattr_copyable(_name: &std::ffi::OsStr) -> bool {
    true
}

#[cfg(unix)]
fn is_unsupported(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOTSUP))
        || err.kind() == std::io::ErrorKind::Unsupported
}

/// Filesystem flags (`chflags`) of an object, where the platform has them
#[cfg(target_os = "macos")]
pub fn file_flags(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::macos::fs::MetadataExt;
    Some(metadata.st_flags())
}

#[cfg(target_os = "freebsd")]
pub fn file_flags(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::freebsd::fs::MetadataExt;
    Some(metadata.st_flags())
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
pub fn file_flags(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Apply the attributes captured in `entry` to `dest`.
///
/// Order matters: ownership before permission bits (chown clears set-id
/// bits), times after everything that touches the inode, flags last since
/// immutable flags block further changes.
pub fn apply_metadata(entry: &Entry, dest: &Path, preserve: &PreserveOptions) -> Result<()> {
    let mut failures: Vec<String> = Vec::new();
    let is_symlink = matches!(entry.kind, EntryKind::Symlink { .. });

    if preserve.xattrs && !is_symlink {
        if let Some(e) = &entry.xattr_error {
            failures.push(format!("xattrs: {}", e));
        }
        for attr in &entry.xattrs {
            if let Err(e) = set_xattr(dest, attr) {
                failures.push(format!("xattr {}: {}", attr.name.to_string_lossy(), e));
            }
        }
    }

    if let Err(e) = apply_ownership(entry, dest, preserve) {
        failures.push(format!("ownership: {}", e));
    }

    if preserve.permissions && !is_symlink {
        if let Err(e) = apply_permissions(entry, dest) {
            failures.push(format!("permissions: {}", e));
        }
    }

    if preserve.times {
        if let Err(e) = apply_times(entry, dest) {
            failures.push(format!("timestamps: {}", e));
        }
    }

    if preserve.flags {
        if let Err(e) = apply_flags(entry, dest) {
            failures.push(format!("flags: {}", e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        debug!(path = %dest.display(), failures = failures.len(), "attribute preservation incomplete");
        Err(MirrorCopyError::AttributeCopyFailed {
            path: dest.to_path_buf(),
            details: failures.join("; "),
        })
    }
}

#[cfg(unix)]
fn set_xattr(dest: &Path, attr: &Xattr) -> std::io::Result<()> {
    xattr::set(dest, &attr.name, &attr.value)
}

#[cfg(not(unix))]
fn set_xattr(_dest: &Path, _attr: &Xattr) -> std::io::Result<()> {
    Ok(())
}

/// Unprivileged users cannot give files away; that refusal is not a failure.
#[cfg(unix)]
fn apply_ownership(entry: &Entry, dest: &Path, preserve: &PreserveOptions) -> std::io::Result<()> {
    let uid = preserve.owner.then_some(entry.uid);
    let gid = preserve.group.then_some(entry.gid);
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }

    match std::os::unix::fs::lchown(dest, uid, gid) {
        Err(e)
            if e.kind() == std::io::ErrorKind::PermissionDenied
                && !nix::unistd::geteuid().is_root() =>
        {
            trace!(path = %dest.display(), "ownership not preserved without privileges");
            Ok(())
        }
        other => other,
    }
}

#[cfg(not(unix))]
fn apply_ownership(_entry: &Entry, _dest: &Path, _preserve: &PreserveOptions) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_permissions(entry: &Entry, dest: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dest, std::fs::Permissions::from_mode(entry.permissions & 0o7777))
}

#[cfg(not(unix))]
fn apply_permissions(entry: &Entry, dest: &Path) -> std::io::Result<()> {
    let mut permissions = std::fs::metadata(dest)?.permissions();
    permissions.set_readonly(entry.permissions & 0o222 == 0);
    std::fs::set_permissions(dest, permissions)
}

fn apply_times(entry: &Entry, dest: &Path) -> std::io::Result<()> {
    let atime = filetime::FileTime::from_system_time(entry.accessed);
    let mtime = filetime::FileTime::from_system_time(entry.modified);

    apply_creation_time(entry, dest, atime)?;
    filetime::set_symlink_file_times(dest, atime, mtime)
}

/// APFS and HFS+ pull the birth time back when mtime is set earlier than it,
/// so writing the creation time as mtime first carries it over.
#[cfg(target_os = "macos")]
fn apply_creation_time(
    entry: &Entry,
    dest: &Path,
    atime: filetime::FileTime,
) -> std::io::Result<()> {
    match entry.created {
        Some(created) if created < entry.modified => filetime::set_symlink_file_times(
            dest,
            atime,
            filetime::FileTime::from_system_time(created),
        ),
        _ => Ok(()),
    }
}

#[cfg(not(target_os = "macos"))]
fn apply_creation_time(
    _entry: &Entry,
    _dest: &Path,
    _atime: filetime::FileTime,
) -> std::io::Result<()> {
    Ok(())
}

#[cfg(any(target_os = "macos", target_os = "freebsd"))]
fn apply_flags(entry: &Entry, dest: &Path) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let flags = match entry.flags {
        Some(flags) if flags != 0 => flags,
        _ => return Ok(()),
    };
    let c_path = std::ffi::CString::new(dest.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: c_path is a valid NUL-terminated string for the call's duration.
    let rc = unsafe { libc::lchflags(c_path.as_ptr(), flags as _) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
fn apply_flags(_entry: &Entry, _dest: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs::{ScanConfig, Scanner};
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn scan_one(root: &Path, name: &str) -> Entry {
        let scanner = Scanner::new(ScanConfig::default());
        scanner
            .scan(root)
            .unwrap()
            .filter_map(|e| e.ok())
            .find(|e| e.relative_path == Path::new(name))
            .unwrap()
    }

    #[test]
    fn permissions_and_times_are_applied() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("script.sh");
        std::fs::write(&file, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o751)).unwrap();
        let past = SystemTime::UNIX_EPOCH + Duration::from_secs(1_500_000_000);
        filetime::set_file_mtime(&file, filetime::FileTime::from_system_time(past)).unwrap();

        let entry = scan_one(src.path(), "script.sh");
        let dest = dst.path().join("script.sh");
        std::fs::write(&dest, b"#!/bin/sh\n").unwrap();

        apply_metadata(&entry, &dest, &PreserveOptions::default()).unwrap();

        let meta = std::fs::metadata(&dest).unwrap();
        assert_eq!(meta.permissions().mode() & 0o7777, 0o751);
        assert_eq!(meta.mtime(), 1_500_000_000);
    }

    #[test]
    fn disabled_preservation_leaves_destination_alone() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("ro.txt");
        std::fs::write(&file, b"x").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o400)).unwrap();

        let entry = scan_one(src.path(), "ro.txt");
        let dest = dst.path().join("ro.txt");
        std::fs::write(&dest, b"x").unwrap();
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o644)).unwrap();

        let preserve = PreserveOptions {
            permissions: false,
            times: false,
            ..Default::default()
        };
        apply_metadata(&entry, &dest, &preserve).unwrap();
        assert_eq!(std::fs::metadata(&dest).unwrap().permissions().mode() & 0o777, 0o644);
    }

    #[test]
    fn user_xattrs_round_trip_when_supported() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("tagged");
        std::fs::write(&file, b"x").unwrap();
        if xattr::set(&file, "user.mirrorcopy.test", b"blue").is_err() {
            // tmpfs without user xattrs
            return;
        }

        let entry = scan_one(src.path(), "tagged");
        assert!(entry.xattrs.iter().any(|a| a.name == "user.mirrorcopy.test"));

        let dest = dst.path().join("tagged");
        std::fs::write(&dest, b"x").unwrap();
        if apply_metadata(&entry, &dest, &PreserveOptions::default()).is_err() {
            return;
        }
        assert_eq!(
            xattr::get(&dest, "user.mirrorcopy.test").unwrap(),
            Some(b"blue".to_vec())
        );
    }

    #[test]
    fn unreadable_xattrs_fail_only_the_attributes() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let file = src.path().join("report.pdf");
        std::fs::write(&file, b"%PDF").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o640)).unwrap();

        let mut entry = scan_one(src.path(), "report.pdf");
        entry.xattr_error = Some("Operation not permitted (os error 1)".into());
        let dest = dst.path().join("report.pdf");
        std::fs::write(&dest, b"%PDF").unwrap();

        let err = apply_metadata(&entry, &dest, &PreserveOptions::default()).unwrap_err();
        match err {
            MirrorCopyError::AttributeCopyFailed { path, details } => {
                assert_eq!(path, dest);
                assert!(details.starts_with("xattrs: Operation not permitted"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // the remaining attributes still land
        let meta = std::fs::metadata(&dest).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o640);

        let preserve = PreserveOptions {
            xattrs: false,
            ..Default::default()
        };
        apply_metadata(&entry, &dest, &preserve).unwrap();
    }

    #[test]
    fn missing_destination_reports_attribute_failure() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("f"), b"x").unwrap();
        let entry = scan_one(src.path(), "f");

        let err = apply_metadata(&entry, &src.path().join("gone"), &PreserveOptions::default())
            .unwrap_err();
        match err {
            MirrorCopyError::AttributeCopyFailed { details, .. } => {
                assert!(details.contains("permissions"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
